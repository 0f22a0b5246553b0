use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use wasi_stdio_shim::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., runtime.headless)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Config key (e.g., channel.rpc)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config_file: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load(config_file)?;

    match args.command {
        ConfigCommands::Show { format } => show_config(&config, &format),
        ConfigCommands::Get { key } => {
            println!("{}", config.get_value(&key)?);
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            config.set_value(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config.config_path()?.display());
            Ok(())
        }
        ConfigCommands::Init { force } => init_config(&config, force),
    }
}

fn show_config(config: &Config, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "toml" => println!("{}", toml::to_string_pretty(config)?),
        other => anyhow::bail!("Unknown format: {} (expected toml or json)", other),
    }
    Ok(())
}

fn init_config(config: &Config, force: bool) -> Result<()> {
    let path = config.config_path()?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let path = config.save_with_template()?;
    println!("Created config file at {}", path.display());
    Ok(())
}
