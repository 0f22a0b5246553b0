//! Creating the one channel that speaks over the process's own stdin/stdout.
//!
//! Two strategies exist. [`PreservingBootstrap`] binds the channel straight
//! to descriptors 0 and 1 and never touches the descriptor table, which is
//! what a runtime with a fixed stdio transport needs. [`HostDefaultBootstrap`]
//! is the stock behaviour: move the channel onto fresh high descriptors and
//! point stdout at stderr so stray prints cannot corrupt the stream. Which
//! one [`channel_from_stdio`] uses is decided at build time.

pub mod guard;
pub mod host_default;

pub use guard::{OneShot, STDIO_GUARD};
pub use host_default::HostDefaultBootstrap;

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info};

use crate::channel::{CallbackReader, ChannelHost, ChannelId, RuntimeMode, StreamKind};
use crate::posix::FdError;
use crate::posix::fd::{STDIN_FILENO, STDOUT_FILENO};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("can only be opened in headless mode")]
    Mode,

    #[error("channel was already open")]
    AlreadyOpen,

    #[error("failed to move stdio channel: {0}")]
    Rebind(#[from] FdError),
}

/// A way of turning the process's stdio into a channel.
pub trait StdioBootstrap {
    /// Open the stdio channel on `host`. Diagnostic lines go to `diag`.
    ///
    /// With `rpc` the channel is handed to the request engine; otherwise
    /// `on_output` becomes its raw-data handler.
    fn open(
        &self,
        host: &mut dyn ChannelHost,
        rpc: bool,
        on_output: CallbackReader,
        diag: &mut dyn Write,
    ) -> Result<ChannelId, BootstrapError>;
}

/// Binds the channel to descriptors 0 and 1 exactly as they are.
#[derive(Debug, Clone, Copy)]
pub struct PreservingBootstrap<'g> {
    guard: &'g OneShot,
}

impl<'g> PreservingBootstrap<'g> {
    pub fn new(guard: &'g OneShot) -> Self {
        Self { guard }
    }
}

impl StdioBootstrap for PreservingBootstrap<'_> {
    fn open(
        &self,
        host: &mut dyn ChannelHost,
        rpc: bool,
        on_output: CallbackReader,
        diag: &mut dyn Write,
    ) -> Result<ChannelId, BootstrapError> {
        let _ = writeln!(diag, "[shim] channel_from_stdio override active");

        let mode = host.runtime_mode();
        claim(self.guard, mode)?;

        let channel = host.channel_alloc(StreamKind::Stdio);
        channel.stdio.input.init_fd(STDIN_FILENO);
        channel.stdio.output.init_fd(STDOUT_FILENO);
        let id = channel.id;

        start_handler(host, id, rpc, on_output);

        let _ = writeln!(
            diag,
            "[shim] channel_from_stdio rpc={} headless={} embedded={} id={}",
            rpc as i32, mode.headless as i32, mode.embedded as i32, id
        );
        info!("Stdio channel {} bound to fds 0/1 (rpc={})", id, rpc);
        Ok(id)
    }
}

/// Mode check first, then the one-shot guard. A mode failure leaves the
/// guard untouched.
fn claim(guard: &OneShot, mode: RuntimeMode) -> Result<(), BootstrapError> {
    if !mode.owns_stdio() {
        return Err(BootstrapError::Mode);
    }
    if !guard.try_claim() {
        return Err(BootstrapError::AlreadyOpen);
    }
    Ok(())
}

fn start_handler(
    host: &mut dyn ChannelHost,
    id: ChannelId,
    rpc: bool,
    mut on_output: CallbackReader,
) {
    if rpc {
        host.rpc_start(id);
    } else {
        on_output.start("stdin");
        host.raw_start(id, on_output);
    }
    debug!(channel = %id, rpc, "stdio channel started");
}

#[cfg(feature = "stdio-override")]
pub type ActiveBootstrap<'g> = PreservingBootstrap<'g>;

#[cfg(not(feature = "stdio-override"))]
pub type ActiveBootstrap<'g> = HostDefaultBootstrap<'g, crate::posix::ActiveFdOps>;

/// The bootstrap selected for this build.
pub fn active(guard: &OneShot) -> ActiveBootstrap<'_> {
    #[cfg(feature = "stdio-override")]
    {
        PreservingBootstrap::new(guard)
    }
    #[cfg(not(feature = "stdio-override"))]
    {
        HostDefaultBootstrap::new(guard, crate::posix::fd_ops())
    }
}

/// Process-level entry point: open the stdio channel with the build's
/// bootstrap, the global guard and stderr for diagnostics.
///
/// Returns the channel id, or [`ChannelId::INVALID`] with `error` set to a
/// message.
pub fn channel_from_stdio(
    host: &mut dyn ChannelHost,
    rpc: bool,
    on_output: CallbackReader,
    error: &mut Option<String>,
) -> ChannelId {
    let mut stderr = io::stderr().lock();
    match active(&STDIO_GUARD).open(host, rpc, on_output, &mut stderr) {
        Ok(id) => id,
        Err(e) => {
            *error = Some(e.to_string());
            ChannelId::INVALID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Handler, Host};

    fn host(headless: bool, embedded: bool) -> Host {
        Host::new(RuntimeMode { headless, embedded })
    }

    fn open(
        guard: &OneShot,
        host: &mut Host,
        rpc: bool,
    ) -> (Result<ChannelId, BootstrapError>, String) {
        let mut diag = Vec::new();
        let result =
            PreservingBootstrap::new(guard).open(host, rpc, CallbackReader::none(), &mut diag);
        (result, String::from_utf8(diag).unwrap())
    }

    #[test]
    fn embedded_rpc_binds_fds_zero_and_one() {
        let guard = OneShot::new();
        let mut host = host(false, true);
        let (result, diag) = open(&guard, &mut host, true);

        let id = result.unwrap();
        assert!(id.is_valid());
        assert!(guard.is_claimed());

        let channel = host.channel(id).unwrap();
        assert_eq!(channel.kind, StreamKind::Stdio);
        assert_eq!(channel.stdio.input.fd(), Some(0));
        assert_eq!(channel.stdio.output.fd(), Some(1));
        assert!(channel.is_rpc());

        let lines: Vec<&str> = diag.lines().collect();
        assert_eq!(lines[0], "[shim] channel_from_stdio override active");
        assert_eq!(
            lines[1],
            format!("[shim] channel_from_stdio rpc=1 headless=0 embedded=1 id={}", id)
        );
    }

    #[test]
    fn raw_mode_installs_started_reader() {
        let guard = OneShot::new();
        let mut host = host(true, false);
        let (result, diag) = open(&guard, &mut host, false);
        let id = result.unwrap();

        match &host.channel(id).unwrap().handler {
            Handler::Raw(reader) => assert_eq!(reader.type_name(), Some("stdin")),
            other => panic!("expected raw handler, got {:?}", other),
        }
        assert!(diag.contains("rpc=0 headless=1 embedded=0"));
    }

    #[test]
    fn second_open_is_rejected() {
        let guard = OneShot::new();
        let mut host = host(true, false);
        open(&guard, &mut host, true).0.unwrap();

        let (result, diag) = open(&guard, &mut host, true);
        assert_eq!(result, Err(BootstrapError::AlreadyOpen));
        assert_eq!(diag, "[shim] channel_from_stdio override active\n");
    }

    #[test]
    fn mode_error_leaves_guard_clear() {
        let guard = OneShot::new();
        let mut interactive = host(false, false);
        let (result, diag) = open(&guard, &mut interactive, true);

        assert_eq!(result, Err(BootstrapError::Mode));
        assert_eq!(result.unwrap_err().to_string(), "can only be opened in headless mode");
        assert!(!guard.is_claimed());
        assert!(diag.contains("override active"));
        assert!(!diag.contains("id="));

        let mut headless = host(true, false);
        assert!(open(&guard, &mut headless, true).0.is_ok());
    }

    #[test]
    fn mode_is_checked_before_guard() {
        let guard = OneShot::new();
        assert!(guard.try_claim());
        let mut interactive = host(false, false);
        assert_eq!(open(&guard, &mut interactive, false).0, Err(BootstrapError::Mode));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            BootstrapError::AlreadyOpen.to_string(),
            "channel was already open"
        );
    }
}
