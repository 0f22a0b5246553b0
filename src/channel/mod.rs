//! The host side of the stdio channel: ids, channel objects, the streams
//! bound to them, and the [`ChannelHost`] boundary the bootstrap talks to.

pub mod event_loop;
pub mod host;
pub mod registry;
pub mod rpc;
pub mod stream;

pub use event_loop::{EventLoop, RunSummary};
pub use host::Host;
pub use registry::ChannelRegistry;
pub use rpc::{RpcEngine, RpcError};
pub use stream::{ReadStream, WriteStream};

use serde::Serialize;
use std::fmt;

/// Process-wide channel identifier. `0` is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Sentinel returned when no channel was created.
    pub const INVALID: ChannelId = ChannelId(0);

    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport a channel was allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The process's own stdin/stdout.
    Stdio,
    /// In-process channel with no descriptors of its own.
    Internal,
}

/// Operating modes that legitimately own the process's stdio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeMode {
    pub headless: bool,
    pub embedded: bool,
}

impl RuntimeMode {
    pub fn owns_stdio(&self) -> bool {
        self.headless || self.embedded
    }
}

type DataCallback = Box<dyn FnMut(&[u8], bool) + Send>;

/// Raw-data handler: called once per chunk with `eof = false`, then once
/// with an empty slice and `eof = true`.
pub struct CallbackReader {
    cb: Option<DataCallback>,
    type_name: Option<&'static str>,
}

impl CallbackReader {
    pub fn new(cb: impl FnMut(&[u8], bool) + Send + 'static) -> Self {
        Self {
            cb: Some(Box::new(cb)),
            type_name: None,
        }
    }

    /// A reader that drops all data.
    pub fn none() -> Self {
        Self {
            cb: None,
            type_name: None,
        }
    }

    /// `callback_reader_start`: mark the reader active under `type_name`.
    pub fn start(&mut self, type_name: &'static str) {
        self.type_name = Some(type_name);
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }

    pub(crate) fn deliver(&mut self, data: &[u8], eof: bool) {
        if let Some(cb) = self.cb.as_mut() {
            cb(data, eof);
        }
    }
}

impl fmt::Debug for CallbackReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackReader")
            .field("has_callback", &self.cb.is_some())
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// What consumes a channel's input once it is started.
#[derive(Debug, Default)]
pub enum Handler {
    #[default]
    Idle,
    Rpc,
    Raw(CallbackReader),
}

#[derive(Debug, Default)]
pub struct StdioStreams {
    pub input: ReadStream,
    pub output: WriteStream,
}

#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: StreamKind,
    pub stdio: StdioStreams,
    pub handler: Handler,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, kind: StreamKind) -> Self {
        Self {
            id,
            kind,
            stdio: StdioStreams::default(),
            handler: Handler::Idle,
        }
    }

    pub fn is_rpc(&self) -> bool {
        matches!(self.handler, Handler::Rpc)
    }
}

/// The host channel subsystem, as seen from the stdio bootstrap.
pub trait ChannelHost {
    /// Headless/embedded flags; read-only from the bootstrap's side.
    fn runtime_mode(&self) -> RuntimeMode;

    fn channel_alloc(&mut self, kind: StreamKind) -> &mut Channel;

    /// Hand the channel to the request/response engine.
    fn rpc_start(&mut self, id: ChannelId);

    /// Install `reader` as the channel's raw-data handler.
    fn raw_start(&mut self, id: ChannelId, reader: CallbackReader);
}
