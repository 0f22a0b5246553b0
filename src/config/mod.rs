use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::channel::RuntimeMode;
use crate::channel::event_loop::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINE_LENGTH};
use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved config location (not serialized)
    #[serde(skip)]
    pub paths: Option<Paths>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which modes the process runs in. Either one lets it own stdio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub headless: bool,

    #[serde(default)]
    pub embedded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Start the request engine instead of raw byte forwarding
    #[serde(default = "default_true")]
    pub rpc: bool,

    /// Bytes requested per read from stdin
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Longest request line the RPC engine buffers before rejecting it
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}
fn default_read_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            rpc: default_true(),
            read_chunk_size: default_read_chunk_size(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the resolved location. A missing file yields defaults;
    /// nothing is written.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut paths = Paths::resolve()?;
        if let Some(file) = config_file {
            paths = paths.with_config_file(file);
        }
        Self::load_from(paths)
    }

    pub fn load_from(paths: Paths) -> Result<Self> {
        let path = paths.config_file();

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Config::default()
        };
        config.validate()?;
        config.paths = Some(paths);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channel.read_chunk_size == 0 {
            anyhow::bail!("channel.read_chunk_size must be greater than zero");
        }
        if self.channel.max_line_length == 0 {
            anyhow::bail!("channel.max_line_length must be greater than zero");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let paths = self.resolved_paths()?;
        paths.ensure_config_parent()?;

        let content = toml::to_string_pretty(self)?;
        fs::write(paths.config_file(), content)?;

        Ok(())
    }

    /// Write the commented default template (for `config init`).
    pub fn save_with_template(&self) -> Result<PathBuf> {
        let paths = self.resolved_paths()?;
        paths.ensure_config_parent()?;

        let path = paths.config_file();
        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(path)
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_paths()?.config_file())
    }

    fn resolved_paths(&self) -> Result<Paths> {
        match &self.paths {
            Some(paths) => Ok(paths.clone()),
            None => Paths::resolve(),
        }
    }

    pub fn runtime_mode(&self) -> RuntimeMode {
        RuntimeMode {
            headless: self.runtime.headless,
            embedded: self.runtime.embedded,
        }
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["runtime", "headless"] => Ok(self.runtime.headless.to_string()),
            ["runtime", "embedded"] => Ok(self.runtime.embedded.to_string()),
            ["channel", "rpc"] => Ok(self.channel.rpc.to_string()),
            ["channel", "read_chunk_size"] => Ok(self.channel.read_chunk_size.to_string()),
            ["channel", "max_line_length"] => Ok(self.channel.max_line_length.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["runtime", "headless"] => self.runtime.headless = value.parse()?,
            ["runtime", "embedded"] => self.runtime.embedded = value.parse()?,
            ["channel", "rpc"] => self.channel.rpc = value.parse()?,
            ["channel", "read_chunk_size"] => self.channel.read_chunk_size = value.parse()?,
            ["channel", "max_line_length"] => self.channel.max_line_length = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        self.validate()
    }
}

/// Default config template with comments (written by `config init`)
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# stdio-shim configuration

[runtime]
# The stdio channel can only be opened when one of these is set.
# `serve --headless` / `serve --embed` override them per run.
headless = false
embedded = false

[channel]
# true: JSON-lines requests on stdin, replies on stdout
# false: forward raw stdin chunks
rpc = true
read_chunk_size = 65536
# Request lines longer than this get an error reply and are skipped.
max_line_length = 4194304

[logging]
# Used when RUST_LOG is unset. Logs always go to stderr.
level = "info"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths_in(dir: &TempDir) -> Paths {
        Paths {
            config_dir: dir.path().join("conf"),
            config_override: None,
        }
    }

    #[test]
    fn missing_file_gives_defaults_without_writing() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let config = Config::load_from(paths.clone()).unwrap();

        assert!(!config.runtime.headless);
        assert!(!config.runtime.embedded);
        assert!(config.channel.rpc);
        assert_eq!(config.channel.read_chunk_size, 64 * 1024);
        assert_eq!(config.channel.max_line_length, 4 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(!paths.config_file().exists());
        assert!(!config.runtime_mode().owns_stdio());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("shim.toml");
        fs::write(&file, "[runtime]\nembedded = true\n").unwrap();

        let paths = paths_in(&tmp).with_config_file(&file);
        let config = Config::load_from(paths).unwrap();
        assert!(config.runtime.embedded);
        assert!(config.channel.rpc);
        assert_eq!(
            config.runtime_mode(),
            RuntimeMode {
                headless: false,
                embedded: true
            }
        );
    }

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let defaults = Config::default();
        assert_eq!(config.runtime.headless, defaults.runtime.headless);
        assert_eq!(config.channel.rpc, defaults.channel.rpc);
        assert_eq!(config.channel.read_chunk_size, defaults.channel.read_chunk_size);
        assert_eq!(config.channel.max_line_length, defaults.channel.max_line_length);
        assert_eq!(config.logging.level, defaults.logging.level);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.toml");
        fs::write(&file, "[channel]\nread_chunk_size = 0\n").unwrap();

        let err = Config::load_from(paths_in(&tmp).with_config_file(&file)).unwrap_err();
        assert!(err.to_string().contains("read_chunk_size"));
    }

    #[test]
    fn max_line_length_is_configurable() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("limit.toml");
        fs::write(&file, "[channel]\nmax_line_length = 1024\n").unwrap();

        let mut config = Config::load_from(paths_in(&tmp).with_config_file(&file)).unwrap();
        assert_eq!(config.channel.max_line_length, 1024);
        assert_eq!(config.get_value("channel.max_line_length").unwrap(), "1024");

        config.set_value("channel.max_line_length", "2048").unwrap();
        assert_eq!(config.channel.max_line_length, 2048);
        assert!(config.set_value("channel.max_line_length", "0").is_err());
    }

    #[test]
    fn malformed_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("broken.toml");
        fs::write(&file, "[runtime\n").unwrap();

        let err = Config::load_from(paths_in(&tmp).with_config_file(&file)).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn set_then_save_round_trips() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::load_from(paths_in(&tmp)).unwrap();
        config.set_value("runtime.headless", "true").unwrap();
        config.set_value("channel.rpc", "false").unwrap();
        config.set_value("logging.level", "debug").unwrap();
        config.save().unwrap();

        let reloaded = Config::load_from(paths_in(&tmp)).unwrap();
        assert_eq!(reloaded.get_value("runtime.headless").unwrap(), "true");
        assert_eq!(reloaded.get_value("channel.rpc").unwrap(), "false");
        assert_eq!(reloaded.get_value("logging.level").unwrap(), "debug");
    }

    #[test]
    fn unknown_and_invalid_values() {
        let mut config = Config::default();
        assert!(config.get_value("channel.override").is_err());
        assert!(config.set_value("nope", "1").is_err());
        assert!(config.set_value("runtime.embedded", "yes").is_err());
        assert!(config.set_value("channel.read_chunk_size", "0").is_err());
    }

    #[test]
    fn save_with_template_writes_commented_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(paths_in(&tmp)).unwrap();
        let path = config.save_with_template().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# stdio-shim configuration"));
        assert_eq!(path, config.config_path().unwrap());
    }
}
