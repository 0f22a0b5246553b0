//! Environment access with the contract of libuv's `uv_os_getenv`/
//! `uv_os_setenv`/`uv_os_unsetenv`, which the sandboxed runtime does not
//! provide. Every call reads or writes the live process environment;
//! nothing is cached.
//!
//! All access goes through `std::env`, so it shares std's environment lock
//! with every other std reader in the process (path resolution, tempfile,
//! `RUST_LOG`). Writers are still `unsafe`: code outside std, such as C
//! linked into the same process, can read the environment without that lock.

use std::env;
use std::ffi::OsString;

use libc::c_int;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnvError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("environment variable not found")]
    NotFound,

    /// `needed` includes the NUL terminator.
    #[error("buffer too small: {needed} bytes required")]
    BufferTooSmall { needed: usize },

    #[error("failed to update environment")]
    Io,
}

impl EnvError {
    /// POSIX errno for this error.
    pub fn errno(&self) -> c_int {
        match self {
            EnvError::InvalidArgument => libc::EINVAL,
            EnvError::NotFound => libc::ENOENT,
            EnvError::BufferTooSmall { .. } => libc::ENOBUFS,
            EnvError::Io => libc::EIO,
        }
    }

    /// libuv-style status code (`UV_EINVAL`, `UV_ENOENT`, ...).
    pub fn uv_code(&self) -> c_int {
        -self.errno()
    }
}

fn check_no_nul(s: &str) -> Result<(), EnvError> {
    if s.contains('\0') {
        return Err(EnvError::InvalidArgument);
    }
    Ok(())
}

/// Names the C library's `setenv`/`unsetenv` reject with `EINVAL`.
fn check_settable(name: &str) -> Result<(), EnvError> {
    check_no_nul(name)?;
    if name.is_empty() || name.contains('=') {
        return Err(EnvError::Io);
    }
    Ok(())
}

/// Copy the value of `name` plus a NUL terminator into `buffer`.
///
/// The capacity is `buffer.len()`. On success `size` holds the number of
/// bytes written (value length + 1). If `buffer` is absent or too short,
/// `size` is set to the required length, nothing is written, and
/// [`EnvError::BufferTooSmall`] is returned so the caller can retry.
pub fn os_getenv(
    name: Option<&str>,
    buffer: Option<&mut [u8]>,
    size: Option<&mut usize>,
) -> Result<(), EnvError> {
    let (Some(name), Some(size)) = (name.filter(|n| !n.is_empty()), size) else {
        return Err(EnvError::InvalidArgument);
    };
    check_no_nul(name)?;
    if name.contains('=') {
        return Err(EnvError::NotFound);
    }
    let value = env::var_os(name)
        .map(OsString::into_encoded_bytes)
        .ok_or(EnvError::NotFound)?;

    let needed = value.len() + 1;
    match buffer {
        Some(buf) if buf.len() >= needed => {
            buf[..value.len()].copy_from_slice(&value);
            buf[value.len()] = 0;
            *size = needed;
            Ok(())
        }
        _ => {
            *size = needed;
            Err(EnvError::BufferTooSmall { needed })
        }
    }
}

/// Set `name` to `value`, always overwriting.
///
/// # Safety
/// No other thread may read or write the environment except through
/// `std::env` while this runs.
pub unsafe fn os_setenv(name: Option<&str>, value: Option<&str>) -> Result<(), EnvError> {
    let (Some(name), Some(value)) = (name, value) else {
        return Err(EnvError::InvalidArgument);
    };
    check_no_nul(value)?;
    check_settable(name)?;

    // SAFETY: upheld by the caller.
    unsafe { env::set_var(name, value) };
    Ok(())
}

/// Remove `name` from the environment.
///
/// # Safety
/// Same contract as [`os_setenv`].
pub unsafe fn os_unsetenv(name: Option<&str>) -> Result<(), EnvError> {
    let Some(name) = name else {
        return Err(EnvError::InvalidArgument);
    };
    check_settable(name)?;

    // SAFETY: upheld by the caller.
    unsafe { env::remove_var(name) };
    Ok(())
}

/// Read `name` as a `String`, asking for the required size first.
pub fn get(name: &str) -> Result<String, EnvError> {
    let mut size = 0usize;
    let needed = match os_getenv(Some(name), None, Some(&mut size)) {
        Err(EnvError::BufferTooSmall { needed }) => needed,
        other => return other.map(|()| String::new()),
    };

    let mut buf = vec![0u8; needed];
    os_getenv(Some(name), Some(&mut buf), Some(&mut size))?;
    buf.truncate(size - 1);
    String::from_utf8(buf).map_err(|_| EnvError::InvalidArgument)
}

/// # Safety
/// Same contract as [`os_setenv`].
pub unsafe fn set(name: &str, value: &str) -> Result<(), EnvError> {
    // SAFETY: upheld by the caller.
    unsafe { os_setenv(Some(name), Some(value)) }
}

/// # Safety
/// Same contract as [`os_setenv`].
pub unsafe fn unset(name: &str) -> Result<(), EnvError> {
    // SAFETY: upheld by the caller.
    unsafe { os_unsetenv(Some(name)) }
}

/// `std::env::var`-shaped lookup routed through this module.
pub fn var(name: &str) -> Result<String, std::env::VarError> {
    match get(name) {
        Ok(value) => Ok(value),
        Err(EnvError::InvalidArgument) => Err(std::env::VarError::NotUnicode(name.into())),
        Err(_) => Err(std::env::VarError::NotPresent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every reader in the test binary goes through std::env, which these
    // writes lock against.
    fn set(name: &str, value: &str) -> Result<(), EnvError> {
        unsafe { super::set(name, value) }
    }

    fn unset(name: &str) -> Result<(), EnvError> {
        unsafe { super::unset(name) }
    }

    fn os_setenv(name: Option<&str>, value: Option<&str>) -> Result<(), EnvError> {
        unsafe { super::os_setenv(name, value) }
    }

    fn os_unsetenv(name: Option<&str>) -> Result<(), EnvError> {
        unsafe { super::os_unsetenv(name) }
    }

    #[test]
    fn set_then_get_reports_size_with_terminator() {
        set("STDIO_SHIM_TEST_X", "42").unwrap();

        let mut buf = [0xffu8; 16];
        let mut size = 0;
        os_getenv(Some("STDIO_SHIM_TEST_X"), Some(&mut buf), Some(&mut size)).unwrap();
        assert_eq!(size, 3);
        assert_eq!(&buf[..3], b"42\0");

        unset("STDIO_SHIM_TEST_X").unwrap();
        let mut size = 0;
        assert_eq!(
            os_getenv(Some("STDIO_SHIM_TEST_X"), Some(&mut buf), Some(&mut size)),
            Err(EnvError::NotFound)
        );
    }

    #[test]
    fn short_buffer_reports_exact_size_without_writing() {
        set("STDIO_SHIM_TEST_SHORT", "hello").unwrap();

        let mut buf = [0xaau8; 5];
        let mut size = 0;
        assert_eq!(
            os_getenv(Some("STDIO_SHIM_TEST_SHORT"), Some(&mut buf), Some(&mut size)),
            Err(EnvError::BufferTooSmall { needed: 6 })
        );
        assert_eq!(size, 6);
        assert_eq!(buf, [0xaa; 5]);

        let mut exact = vec![0u8; size];
        os_getenv(Some("STDIO_SHIM_TEST_SHORT"), Some(&mut exact), Some(&mut size)).unwrap();
        assert_eq!(size, 6);
        assert_eq!(exact, b"hello\0");

        unset("STDIO_SHIM_TEST_SHORT").unwrap();
    }

    #[test]
    fn missing_buffer_is_a_size_query() {
        set("STDIO_SHIM_TEST_QUERY", "abc").unwrap();
        let mut size = 0;
        assert_eq!(
            os_getenv(Some("STDIO_SHIM_TEST_QUERY"), None, Some(&mut size)),
            Err(EnvError::BufferTooSmall { needed: 4 })
        );
        assert_eq!(size, 4);
        unset("STDIO_SHIM_TEST_QUERY").unwrap();
    }

    #[test]
    fn getenv_argument_validation() {
        let mut size = 0;
        let mut buf = [0u8; 8];
        assert_eq!(
            os_getenv(None, Some(&mut buf), Some(&mut size)),
            Err(EnvError::InvalidArgument)
        );
        assert_eq!(
            os_getenv(Some(""), Some(&mut buf), Some(&mut size)),
            Err(EnvError::InvalidArgument)
        );
        assert_eq!(
            os_getenv(Some("PATH"), Some(&mut buf), None),
            Err(EnvError::InvalidArgument)
        );
        assert_eq!(
            os_getenv(Some("BAD\0NAME"), Some(&mut buf), Some(&mut size)),
            Err(EnvError::InvalidArgument)
        );
    }

    #[test]
    fn setenv_argument_validation() {
        assert_eq!(os_setenv(None, Some("v")), Err(EnvError::InvalidArgument));
        assert_eq!(
            os_setenv(Some("STDIO_SHIM_TEST_NOVALUE"), None),
            Err(EnvError::InvalidArgument)
        );
        assert_eq!(os_unsetenv(None), Err(EnvError::InvalidArgument));
    }

    #[test]
    fn rejected_names_map_to_io() {
        // POSIX setenv/unsetenv reject empty names and names containing '='.
        assert_eq!(set("STDIO=SHIM", "1"), Err(EnvError::Io));
        assert_eq!(set("", "1"), Err(EnvError::Io));
        assert_eq!(unset("STDIO=SHIM"), Err(EnvError::Io));
        assert_eq!(unset(""), Err(EnvError::Io));
    }

    #[test]
    fn nul_bytes_are_invalid_not_a_panic() {
        assert_eq!(set("STDIO_SHIM\0NUL", "1"), Err(EnvError::InvalidArgument));
        assert_eq!(set("STDIO_SHIM_TEST_NUL", "a\0b"), Err(EnvError::InvalidArgument));
        assert_eq!(unset("STDIO_SHIM\0NUL"), Err(EnvError::InvalidArgument));
    }

    #[test]
    fn writes_are_visible_to_std_readers() {
        set("STDIO_SHIM_TEST_STD", "shared").unwrap();
        assert_eq!(std::env::var("STDIO_SHIM_TEST_STD").unwrap(), "shared");
        unset("STDIO_SHIM_TEST_STD").unwrap();
        assert!(std::env::var_os("STDIO_SHIM_TEST_STD").is_none());
    }

    #[test]
    fn set_overwrites_existing_value() {
        set("STDIO_SHIM_TEST_OVERWRITE", "first").unwrap();
        set("STDIO_SHIM_TEST_OVERWRITE", "second").unwrap();
        assert_eq!(get("STDIO_SHIM_TEST_OVERWRITE").unwrap(), "second");
        unset("STDIO_SHIM_TEST_OVERWRITE").unwrap();
    }

    #[test]
    fn empty_value_round_trips() {
        set("STDIO_SHIM_TEST_EMPTY", "").unwrap();
        let mut size = 0;
        let mut buf = [9u8; 1];
        os_getenv(Some("STDIO_SHIM_TEST_EMPTY"), Some(&mut buf), Some(&mut size)).unwrap();
        assert_eq!(size, 1);
        assert_eq!(buf, [0]);
        assert_eq!(get("STDIO_SHIM_TEST_EMPTY").unwrap(), "");
        unset("STDIO_SHIM_TEST_EMPTY").unwrap();
    }

    #[test]
    fn unset_of_absent_variable_succeeds() {
        assert_eq!(unset("STDIO_SHIM_TEST_NEVER_SET"), Ok(()));
        assert_eq!(get("STDIO_SHIM_TEST_NEVER_SET"), Err(EnvError::NotFound));
    }

    #[test]
    fn var_adapter() {
        set("STDIO_SHIM_TEST_VAR", "/abs").unwrap();
        assert_eq!(var("STDIO_SHIM_TEST_VAR").unwrap(), "/abs");
        unset("STDIO_SHIM_TEST_VAR").unwrap();
        assert_eq!(
            var("STDIO_SHIM_TEST_VAR"),
            Err(std::env::VarError::NotPresent)
        );
    }

    #[test]
    fn uv_codes_are_negative_errno() {
        assert_eq!(EnvError::InvalidArgument.uv_code(), -libc::EINVAL);
        assert_eq!(EnvError::NotFound.uv_code(), -libc::ENOENT);
        assert_eq!(EnvError::BufferTooSmall { needed: 1 }.uv_code(), -libc::ENOBUFS);
        assert_eq!(EnvError::Io.uv_code(), -libc::EIO);
    }
}
