//! C entry points for call sites that still issue the raw primitives.
//!
//! These are the replacement symbols a C host links or `#define`s in place
//! of `dup`, `dup2`, `dup3`, `fcntl` and libuv's `uv_os_*env`, so they are
//! always the emulation regardless of what [`super::ActiveFdOps`] is.
//! Descriptor calls return -1 and set `errno` on failure; environment
//! calls return 0 or a negative errno, as libuv does.

use std::ffi::{CStr, c_char};

use libc::c_int;

use super::env::{self, EnvError};
use super::fd::{EmulatedFdOps, FcntlCmd, FdError, FdOps};
use super::set_errno;

fn fd_result(result: Result<c_int, FdError>) -> c_int {
    match result {
        Ok(fd) => fd,
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

fn env_result(result: Result<(), EnvError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.uv_code(),
    }
}

/// Borrow a C string argument. Null stays `None`; non-UTF-8 becomes `Err`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Result<Option<&'a str>, EnvError> {
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by the caller.
    let s = unsafe { CStr::from_ptr(ptr) };
    s.to_str().map(Some).map_err(|_| EnvError::InvalidArgument)
}

#[unsafe(no_mangle)]
pub extern "C" fn stdio_shim_dup(fd: c_int) -> c_int {
    fd_result(EmulatedFdOps.dup(fd))
}

#[unsafe(no_mangle)]
pub extern "C" fn stdio_shim_dup2(oldfd: c_int, newfd: c_int) -> c_int {
    fd_result(EmulatedFdOps.dup2(oldfd, newfd))
}

#[unsafe(no_mangle)]
pub extern "C" fn stdio_shim_dup3(oldfd: c_int, newfd: c_int, flags: c_int) -> c_int {
    fd_result(EmulatedFdOps.dup3(oldfd, newfd, flags))
}

/// `fcntl` with its optional argument made explicit; pass 0 when the
/// command takes none.
#[unsafe(no_mangle)]
pub extern "C" fn stdio_shim_fcntl(fd: c_int, cmd: c_int, arg: c_int) -> c_int {
    fd_result(EmulatedFdOps.fcntl(fd, FcntlCmd::from_raw(cmd, arg)))
}

/// # Safety
/// `name` must be null or NUL-terminated. `size` must be null or valid for
/// reads and writes. When both `buffer` and `size` are non-null, `buffer`
/// must be valid for writes of `*size` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stdio_shim_os_getenv(
    name: *const c_char,
    buffer: *mut c_char,
    size: *mut usize,
) -> c_int {
    // SAFETY: see the function contract.
    let name = match unsafe { str_arg(name) } {
        Ok(name) => name,
        Err(e) => return e.uv_code(),
    };
    // SAFETY: see the function contract.
    let size = unsafe { size.as_mut() };
    let buffer = match (&size, buffer.is_null()) {
        (Some(cap), false) => {
            // SAFETY: buffer holds at least *size writable bytes.
            Some(unsafe { std::slice::from_raw_parts_mut(buffer.cast::<u8>(), **cap) })
        }
        _ => None,
    };
    env_result(env::os_getenv(name, buffer, size))
}

/// # Safety
/// `name` and `value` must each be null or NUL-terminated. No other thread
/// may read or write the environment during the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stdio_shim_os_setenv(
    name: *const c_char,
    value: *const c_char,
) -> c_int {
    // SAFETY: see the function contract.
    let args = unsafe { str_arg(name).and_then(|n| str_arg(value).map(|v| (n, v))) };
    match args {
        // SAFETY: see the function contract.
        Ok((name, value)) => env_result(unsafe { env::os_setenv(name, value) }),
        Err(e) => e.uv_code(),
    }
}

/// # Safety
/// `name` must be null or NUL-terminated. No other thread may read or
/// write the environment during the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stdio_shim_os_unsetenv(name: *const c_char) -> c_int {
    // SAFETY: see the function contract.
    match unsafe { str_arg(name) } {
        // SAFETY: see the function contract.
        Ok(name) => env_result(unsafe { env::os_unsetenv(name) }),
        Err(e) => e.uv_code(),
    }
}
