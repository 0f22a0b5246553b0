//! Platform abstraction for the descriptor and environment primitives the
//! stdio bootstrap depends on.
//!
//! Callers go through this module unconditionally. Which descriptor
//! implementation backs [`ActiveFdOps`] is decided at build time:
//! - WASI (or any target without `cfg(unix)`): [`EmulatedFdOps`], because
//!   `dup`/`dup2`/`dup3`/`fcntl(F_DUPFD*)` are missing or unreliable there.
//! - Unix: [`NativeFdOps`] over libc, unless the `emulate-posix` feature
//!   forces the emulation.
//!
//! The environment layer ([`env`]) only needs the C library's
//! `getenv`/`setenv`/`unsetenv`, so it is the same on every target.

pub mod env;
pub mod fd;
pub mod ffi;
#[cfg(unix)]
pub mod native;

pub use env::EnvError;
pub use fd::{EmulatedFdOps, FcntlCmd, Fd, FdError, FdOps, is_standard_stream};
#[cfg(unix)]
pub use native::NativeFdOps;

#[cfg(any(feature = "emulate-posix", not(unix)))]
pub type ActiveFdOps = EmulatedFdOps;

#[cfg(all(unix, not(feature = "emulate-posix")))]
pub type ActiveFdOps = NativeFdOps;

/// Descriptor operations selected for this build.
pub fn fd_ops() -> ActiveFdOps {
    ActiveFdOps::default()
}

/// Whether [`ActiveFdOps`] is the emulation rather than the real syscalls.
pub const fn emulated() -> bool {
    cfg!(any(feature = "emulate-posix", not(unix)))
}

/// Store `code` in the calling thread's `errno`.
pub(crate) fn set_errno(code: libc::c_int) {
    #[cfg(unix)]
    {
        nix::errno::Errno::set_raw(code);
    }

    #[cfg(not(unix))]
    {
        // SAFETY: __errno_location returns a valid pointer to this thread's errno.
        unsafe { *libc::__errno_location() = code };
    }
}

/// Last `errno` value of the calling thread.
pub(crate) fn last_errno() -> libc::c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
