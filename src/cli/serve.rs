use anyhow::Result;
use clap::Args;
use std::io::Write;
use tracing::{debug, info};

use wasi_stdio_shim::bootstrap::channel_from_stdio;
use wasi_stdio_shim::channel::{CallbackReader, EventLoop, Host, RuntimeMode};
use wasi_stdio_shim::config::Config;

#[derive(Args)]
pub struct ServeArgs {
    /// Run as a headless instance (no UI attached)
    #[arg(long)]
    pub headless: bool,

    /// Run embedded in another process that owns our stdio
    #[arg(long)]
    pub embed: bool,

    /// Forward raw stdin chunks to stderr instead of answering requests
    #[arg(long)]
    pub raw: bool,
}

impl ServeArgs {
    /// Flags on the command line add to the configured mode.
    fn mode(&self, config: &Config) -> RuntimeMode {
        let configured = config.runtime_mode();
        RuntimeMode {
            headless: configured.headless || self.headless,
            embedded: configured.embedded || self.embed,
        }
    }

    fn rpc(&self, config: &Config) -> bool {
        config.channel.rpc && !self.raw
    }
}

pub async fn run(args: ServeArgs, config: &Config) -> Result<()> {
    let mode = args.mode(config);
    let rpc = args.rpc(config);
    let event_loop = EventLoop::new(config.channel.read_chunk_size)
        .with_max_line_length(config.channel.max_line_length);
    // SAFETY: main runs a current-thread runtime. The only other thread is
    // the stdin reader, which never touches the environment.
    let event_loop = unsafe { event_loop.allow_env_writes() };
    let mut host = Host::with_event_loop(mode, event_loop);

    let mut error = None;
    let id = channel_from_stdio(&mut host, rpc, raw_forwarder(), &mut error);
    if !id.is_valid() {
        anyhow::bail!(
            "Failed to open stdio channel: {}",
            error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let summary = host.run(id).await?;
    info!(
        "Served channel {}: {} chunks, {} bytes, {} requests",
        id, summary.chunks, summary.bytes, summary.requests
    );
    Ok(())
}

fn raw_forwarder() -> CallbackReader {
    CallbackReader::new(|data, eof| {
        if eof {
            debug!("stdin reached end of stream");
            return;
        }
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = stderr.write_all(data).and_then(|()| stderr.flush()) {
            debug!("Dropping {} raw bytes: {}", data.len(), e);
        }
    })
}
