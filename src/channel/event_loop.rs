use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::rpc::{ChannelInfo, RpcEngine};
use super::{CallbackReader, Channel, Handler};

/// Default read size, matching libuv's 64 KiB stream buffers.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default cap on a buffered RPC request line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

/// What a finished [`EventLoop::run`] saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: usize,
    pub bytes: usize,
    pub requests: usize,
}

/// Drives one started channel until its input reaches end of stream.
///
/// Runs on whatever task awaits it; handlers are always invoked from that
/// task, never from the reader thread.
#[derive(Debug, Clone, Copy)]
pub struct EventLoop {
    chunk_size: usize,
    max_line_length: usize,
    env_writes: bool,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl EventLoop {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            env_writes: false,
        }
    }

    /// Longest RPC line kept while waiting for its newline. Longer input
    /// gets an error reply and is dropped up to the next newline.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Let RPC channels run by this loop use `env_set` and `env_unset`.
    ///
    /// # Safety
    /// While the loop runs, no other thread may read or write the
    /// environment except through `std::env`. See
    /// [`crate::posix::env::os_setenv`].
    pub unsafe fn allow_env_writes(mut self) -> Self {
        self.env_writes = true;
        self
    }

    pub async fn run(&self, channel: &mut Channel) -> Result<RunSummary> {
        match std::mem::take(&mut channel.handler) {
            Handler::Idle => bail!("channel {} was never started", channel.id),
            Handler::Rpc => {
                channel.handler = Handler::Rpc;
                self.run_rpc(channel).await
            }
            Handler::Raw(mut reader) => {
                let summary = self.run_raw(channel, &mut reader).await;
                channel.handler = Handler::Raw(reader);
                summary
            }
        }
    }

    async fn run_raw(
        &self,
        channel: &Channel,
        reader: &mut CallbackReader,
    ) -> Result<RunSummary> {
        let mut chunks = channel
            .stdio
            .input
            .start(self.chunk_size)
            .with_context(|| format!("starting reader for channel {}", channel.id))?;
        let mut summary = RunSummary::default();

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    reader.deliver(&[], true);
                    return Err(e).context("reading channel input");
                }
            };
            summary.chunks += 1;
            summary.bytes += chunk.len();
            reader.deliver(&chunk, false);
        }

        reader.deliver(&[], true);
        info!(
            "Channel {} closed after {} chunks ({} bytes)",
            channel.id, summary.chunks, summary.bytes
        );
        Ok(summary)
    }

    async fn run_rpc(&self, channel: &Channel) -> Result<RunSummary> {
        let mut chunks = channel
            .stdio
            .input
            .start(self.chunk_size)
            .with_context(|| format!("starting reader for channel {}", channel.id))?;
        let mut engine = RpcEngine::new(ChannelInfo {
            id: channel.id,
            input_fd: channel.stdio.input.fd(),
            output_fd: channel.stdio.output.fd(),
        });
        if self.env_writes {
            // SAFETY: the caller of allow_env_writes took on the contract.
            unsafe { engine.allow_env_writes() };
        }
        let mut summary = RunSummary::default();
        let mut pending: Vec<u8> = Vec::new();
        let mut discarding = false;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.context("reading channel input")?;
            summary.chunks += 1;
            summary.bytes += chunk.len();

            let mut data = &chunk[..];
            if discarding {
                match data.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        data = &data[pos + 1..];
                        discarding = false;
                    }
                    None => continue,
                }
            }
            pending.extend_from_slice(data);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Some(out) = engine.handle_line(&line) {
                    send(channel, out)?;
                }
            }

            if pending.len() > self.max_line_length {
                warn!(
                    "Dropping RPC line over {} bytes on channel {}",
                    self.max_line_length, channel.id
                );
                pending.clear();
                discarding = true;
                send(channel, engine.line_too_long(self.max_line_length))?;
            }
        }

        // A final request without a trailing newline still counts.
        if !pending.is_empty()
            && let Some(out) = engine.handle_line(&pending)
        {
            send(channel, out)?;
        }

        summary.requests = engine.handled();
        info!(
            "RPC channel {} closed after {} requests",
            channel.id, summary.requests
        );
        Ok(summary)
    }
}

fn send(channel: &Channel, mut out: String) -> Result<()> {
    out.push('\n');
    channel
        .stdio
        .output
        .write_all(out.as_bytes())
        .with_context(|| format!("writing reply on channel {}", channel.id))?;
    debug!(channel = %channel.id, "rpc reply sent");
    Ok(())
}
