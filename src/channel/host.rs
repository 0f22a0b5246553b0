use anyhow::{Context, Result};
use tracing::debug;

use super::event_loop::{DEFAULT_CHUNK_SIZE, EventLoop, RunSummary};
use super::{CallbackReader, Channel, ChannelHost, ChannelId, ChannelRegistry, Handler};
use super::{RuntimeMode, StreamKind};

/// In-process channel subsystem: owns the registry and runs channels.
#[derive(Debug)]
pub struct Host {
    mode: RuntimeMode,
    channels: ChannelRegistry,
    event_loop: EventLoop,
}

impl Host {
    pub fn new(mode: RuntimeMode) -> Self {
        Self::with_event_loop(mode, EventLoop::new(DEFAULT_CHUNK_SIZE))
    }

    /// Run channels with a configured loop (chunk size, line limit, env
    /// writes).
    pub fn with_event_loop(mode: RuntimeMode, event_loop: EventLoop) -> Self {
        Self {
            mode,
            channels: ChannelRegistry::new(),
            event_loop,
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Run a started channel until its input closes.
    pub async fn run(&mut self, id: ChannelId) -> Result<RunSummary> {
        let channel = self
            .channels
            .get_mut(id)
            .with_context(|| format!("no channel with id {}", id))?;
        self.event_loop.run(channel).await
    }
}

impl ChannelHost for Host {
    fn runtime_mode(&self) -> RuntimeMode {
        self.mode
    }

    fn channel_alloc(&mut self, kind: StreamKind) -> &mut Channel {
        let channel = self.channels.alloc(kind);
        debug!(id = %channel.id, ?kind, "channel allocated");
        channel
    }

    fn rpc_start(&mut self, id: ChannelId) {
        if let Some(channel) = self.channels.get_mut(id) {
            channel.handler = Handler::Rpc;
        }
    }

    fn raw_start(&mut self, id: ChannelId, reader: CallbackReader) {
        if let Some(channel) = self.channels.get_mut(id) {
            channel.handler = Handler::Raw(reader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_sets_handlers() {
        let mut host = Host::new(RuntimeMode::default());
        let rpc = host.channel_alloc(StreamKind::Internal).id;
        let raw = host.channel_alloc(StreamKind::Internal).id;

        host.rpc_start(rpc);
        host.raw_start(raw, CallbackReader::none());

        assert!(host.channel(rpc).unwrap().is_rpc());
        assert!(matches!(
            host.channel(raw).unwrap().handler,
            Handler::Raw(_)
        ));
    }

    #[test]
    fn start_on_unknown_id_is_ignored() {
        let mut host = Host::new(RuntimeMode::default());
        host.rpc_start(ChannelId::INVALID);
        assert!(host.channel(ChannelId::INVALID).is_none());
    }

    #[tokio::test]
    async fn run_unknown_channel_fails() {
        let mut host = Host::new(RuntimeMode::default());
        let err = host.run(ChannelId::INVALID).await.unwrap_err();
        assert!(err.to_string().contains("no channel"));
    }

    #[test]
    fn mode_is_reported() {
        let mode = RuntimeMode {
            headless: false,
            embedded: true,
        };
        let host = Host::with_event_loop(mode, EventLoop::new(16));
        assert_eq!(host.runtime_mode(), mode);
    }
}
