//! Descriptor duplication and file-control emulation.
//!
//! The external transport is a fixed pipe bound to descriptors 0 and 1. A
//! "valid" duplicate that hands back a new number silently detaches the
//! peer on the other end, so none of the emulated operations here ever
//! allocate a descriptor: standard streams come back as themselves and
//! every other request gets a plausible number echoed from its arguments.

use libc::c_int;
use thiserror::Error;

/// Raw descriptor number.
pub type Fd = c_int;

pub const STDIN_FILENO: Fd = 0;
pub const STDOUT_FILENO: Fd = 1;
pub const STDERR_FILENO: Fd = 2;

/// `fcntl` command numbers as the caller's C headers define them. Unix
/// targets take them from their C library; targets without one of their
/// own (WASI) use the Linux numbering, which is what the shim headers
/// fall back to.
pub mod cmd {
    #[cfg(unix)]
    pub use libc::{F_DUPFD, F_DUPFD_CLOEXEC, F_GETFD, F_GETFL, F_SETFD, F_SETFL};

    #[cfg(not(unix))]
    mod pinned {
        use libc::c_int;

        pub const F_DUPFD: c_int = 0;
        pub const F_GETFD: c_int = 1;
        pub const F_SETFD: c_int = 2;
        pub const F_GETFL: c_int = 3;
        pub const F_SETFL: c_int = 4;
        pub const F_DUPFD_CLOEXEC: c_int = 1030;
    }

    #[cfg(not(unix))]
    pub use pinned::*;
}

/// True for stdin, stdout and stderr.
pub fn is_standard_stream(fd: Fd) -> bool {
    (STDIN_FILENO..=STDERR_FILENO).contains(&fd)
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    #[error("bad file descriptor: {0}")]
    BadDescriptor(Fd),

    #[error("operation not supported: fcntl command {0}")]
    Unsupported(c_int),

    #[error("os error {0}")]
    Os(c_int),
}

impl FdError {
    /// POSIX errno for this error.
    pub fn errno(&self) -> c_int {
        match self {
            FdError::BadDescriptor(_) => libc::EBADF,
            FdError::Unsupported(_) => libc::ENOSYS,
            FdError::Os(code) => *code,
        }
    }
}

/// A decoded `fcntl` request: the command plus the one argument it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntlCmd {
    DupFd { min: Fd },
    DupFdCloexec { min: Fd },
    GetFd,
    GetFl,
    SetFd(c_int),
    SetFl(c_int),
    /// Anything else, carried as the raw command number.
    Other(c_int),
}

impl FcntlCmd {
    /// Decode a C-level `fcntl(fd, cmd, arg)` call. `arg` is ignored by the
    /// commands that take none.
    pub fn from_raw(command: c_int, arg: c_int) -> Self {
        match command {
            cmd::F_DUPFD => FcntlCmd::DupFd { min: arg },
            cmd::F_DUPFD_CLOEXEC => FcntlCmd::DupFdCloexec { min: arg },
            cmd::F_GETFD => FcntlCmd::GetFd,
            cmd::F_GETFL => FcntlCmd::GetFl,
            cmd::F_SETFD => FcntlCmd::SetFd(arg),
            cmd::F_SETFL => FcntlCmd::SetFl(arg),
            other => FcntlCmd::Other(other),
        }
    }

    pub fn raw(&self) -> c_int {
        match self {
            FcntlCmd::DupFd { .. } => cmd::F_DUPFD,
            FcntlCmd::DupFdCloexec { .. } => cmd::F_DUPFD_CLOEXEC,
            FcntlCmd::GetFd => cmd::F_GETFD,
            FcntlCmd::GetFl => cmd::F_GETFL,
            FcntlCmd::SetFd(_) => cmd::F_SETFD,
            FcntlCmd::SetFl(_) => cmd::F_SETFL,
            FcntlCmd::Other(c) => *c,
        }
    }
}

/// The descriptor primitives the host's I/O library issues during startup.
#[cfg_attr(test, mockall::automock)]
pub trait FdOps {
    fn dup(&self, fd: Fd) -> Result<Fd, FdError>;

    fn dup2(&self, oldfd: Fd, newfd: Fd) -> Result<Fd, FdError>;

    fn dup3(&self, oldfd: Fd, newfd: Fd, flags: c_int) -> Result<Fd, FdError>;

    fn fcntl(&self, fd: Fd, cmd: FcntlCmd) -> Result<c_int, FdError>;
}

/// Number-preserving stand-ins for `dup`, `dup2`, `dup3` and `fcntl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedFdOps;

impl FdOps for EmulatedFdOps {
    fn dup(&self, fd: Fd) -> Result<Fd, FdError> {
        if fd < 0 {
            return Err(FdError::BadDescriptor(fd));
        }
        Ok(fd)
    }

    fn dup2(&self, _oldfd: Fd, newfd: Fd) -> Result<Fd, FdError> {
        // Callers only ever want a stable target number, not a copy.
        if newfd < 0 {
            return Err(FdError::BadDescriptor(newfd));
        }
        Ok(newfd)
    }

    fn dup3(&self, oldfd: Fd, newfd: Fd, _flags: c_int) -> Result<Fd, FdError> {
        // No close-on-exec semantics on the target runtime.
        self.dup2(oldfd, newfd)
    }

    fn fcntl(&self, fd: Fd, cmd: FcntlCmd) -> Result<c_int, FdError> {
        match cmd {
            FcntlCmd::DupFd { min } | FcntlCmd::DupFdCloexec { min } => {
                if is_standard_stream(fd) {
                    Ok(fd)
                } else {
                    Ok(min)
                }
            }
            FcntlCmd::GetFd | FcntlCmd::GetFl => Ok(0),
            FcntlCmd::SetFd(_) | FcntlCmd::SetFl(_) => Ok(0),
            FcntlCmd::Other(raw) => Err(FdError::Unsupported(raw)),
        }
    }
}
