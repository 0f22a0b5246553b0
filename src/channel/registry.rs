use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Channel, ChannelId, StreamKind};

/// Next id to hand out. Shared by every registry in the process so ids
/// stay unique and monotonic; starts at 1 because 0 is the invalid id.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `channel_alloc`: create a channel with a fresh id.
    pub fn alloc(&mut self, kind: StreamKind) -> &mut Channel {
        let id = ChannelId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));
        self.channels.entry(id).or_insert(Channel::new(id, kind))
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }
}
