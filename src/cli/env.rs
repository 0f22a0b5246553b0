use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::debug;

use wasi_stdio_shim::posix::EnvError;
use wasi_stdio_shim::posix::env;

#[derive(Args)]
pub struct EnvArgs {
    #[command(subcommand)]
    pub command: EnvCommands,
}

#[derive(Subcommand)]
pub enum EnvCommands {
    /// Print a variable's value
    Get {
        name: String,

        /// Initial buffer size in bytes, NUL included
        #[arg(short, long, default_value_t = 256)]
        buffer: usize,
    },

    /// Set (and overwrite) a variable
    Set { name: String, value: String },

    /// Remove a variable
    Unset { name: String },
}

pub fn run(args: EnvArgs) -> Result<()> {
    match args.command {
        EnvCommands::Get { name, buffer } => {
            let value = get_with_retry(&name, buffer)?;
            println!("{}", value);
        }
        // SAFETY: this command runs on the only thread that exists.
        EnvCommands::Set { name, value } => unsafe { env::set(&name, &value) }?,
        // SAFETY: as above.
        EnvCommands::Unset { name } => unsafe { env::unset(&name) }?,
    }
    Ok(())
}

/// Read into a `capacity`-byte buffer, retrying once at the reported size.
fn get_with_retry(name: &str, capacity: usize) -> Result<String, EnvError> {
    let mut buf = vec![0u8; capacity];
    let mut size = 0usize;

    match env::os_getenv(Some(name), Some(buf.as_mut_slice()), Some(&mut size)) {
        Ok(()) => {}
        Err(EnvError::BufferTooSmall { needed }) => {
            debug!(
                "Buffer of {} bytes too small for {}, retrying with {}",
                capacity, name, needed
            );
            buf.resize(needed, 0);
            env::os_getenv(Some(name), Some(buf.as_mut_slice()), Some(&mut size))?;
        }
        Err(e) => return Err(e),
    }

    buf.truncate(size - 1);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test-binary readers all go through std::env, which these writes lock
    // against.
    fn set(name: &str, value: &str) {
        unsafe { env::set(name, value) }.unwrap();
    }

    fn unset(name: &str) {
        unsafe { env::unset(name) }.unwrap();
    }

    #[test]
    fn small_buffer_is_retried_once() {
        set("STDIO_SHIM_CLI_ENV_RETRY", "a longer value");
        let value = get_with_retry("STDIO_SHIM_CLI_ENV_RETRY", 2).unwrap();
        assert_eq!(value, "a longer value");
        unset("STDIO_SHIM_CLI_ENV_RETRY");
    }

    #[test]
    fn exact_buffer_fits() {
        set("STDIO_SHIM_CLI_ENV_EXACT", "abc");
        assert_eq!(get_with_retry("STDIO_SHIM_CLI_ENV_EXACT", 4).unwrap(), "abc");
        unset("STDIO_SHIM_CLI_ENV_EXACT");
    }

    #[test]
    fn missing_variable_is_not_found() {
        assert_eq!(
            get_with_retry("STDIO_SHIM_CLI_ENV_MISSING", 16),
            Err(EnvError::NotFound)
        );
    }
}
