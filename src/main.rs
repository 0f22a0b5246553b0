use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};
use wasi_stdio_shim::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.clone())?;

    // stdout may be the channel transport; logs go to stderr only.
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => cli::serve::run(args, &config).await,
        Commands::Probe => cli::probe::run(),
        Commands::Env(args) => cli::env::run(args),
        Commands::Config(args) => cli::config::run(args, cli.config),
    }
}
