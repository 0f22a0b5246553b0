pub mod config;
pub mod env;
pub mod probe;
pub mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stdio-shim")]
#[command(
    author,
    version,
    about = "Stdio channel bootstrap and POSIX emulation for sandboxed runtimes"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "STDIO_SHIM_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the stdio channel and serve it until stdin closes
    Serve(serve::ServeArgs),

    /// Show what the active descriptor operations return
    Probe,

    /// Environment access through the emulation layer
    Env(env::EnvArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}
