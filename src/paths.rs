//! Config location resolution.
//!
//! The config directory is resolved through a three-level fallback:
//! 1. `STDIO_SHIM_CONFIG_DIR`
//! 2. XDG env var (`XDG_CONFIG_HOME`) via `etcetera`
//! 3. Platform default (~/.config)
//!
//! Lookups go through the environment emulator so the same rules apply on
//! targets where the process environment is emulated. Relative paths are
//! ignored per XDG spec.

use anyhow::{Context, Result};
use std::env::VarError;
use std::path::{Path, PathBuf};

use crate::posix::env;

pub const CONFIG_DIR_ENV: &str = "STDIO_SHIM_CONFIG_DIR";
pub const CONFIG_FILE_ENV: &str = "STDIO_SHIM_CONFIG";

const APP_DIR: &str = "stdio-shim";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Explicit config file, bypassing `config_dir`.
    pub config_override: Option<PathBuf>,
}

impl Paths {
    /// Resolve using the process environment.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(env::var)
    }

    /// Resolve with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = absolute_from_env(&env_fn, CONFIG_DIR_ENV)
            .unwrap_or_else(|| strategy.config_dir().join(APP_DIR));

        // An explicit file may be relative to the working directory.
        let config_override = env_fn(CONFIG_FILE_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            config_dir,
            config_override,
        })
    }

    /// Use `path` as the config file regardless of the environment.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_override = Some(path.into());
        self
    }

    /// The config file: the override if set, else config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(|| self.config_dir.join(CONFIG_FILE))
    }

    /// Create the directory that will hold the config file.
    pub fn ensure_config_parent(&self) -> Result<()> {
        match self.config_file().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => create_dir_with_mode(parent),
            _ => Ok(()),
        }
    }
}

fn absolute_from_env<F>(env_fn: &F, var: &str) -> Option<PathBuf>
where
    F: Fn(&str) -> std::result::Result<String, VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
}

/// Create a directory with mode 0700 per XDG spec.
fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}
