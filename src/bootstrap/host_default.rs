use std::io::Write;

use tracing::info;

use super::{BootstrapError, OneShot, StdioBootstrap, claim, start_handler};
use crate::channel::{CallbackReader, ChannelHost, ChannelId, StreamKind};
use crate::posix::fd::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use crate::posix::{FcntlCmd, Fd, FdOps};

/// First descriptor number the relocated stdio channel may use.
const RELOCATE_MIN_FD: Fd = 3;

/// The host's stock stdio bootstrap.
///
/// When embedded, stdin and stdout are copied to descriptors at or above 3
/// and stdout is pointed at stderr, so the channel keeps the original
/// streams while anything else printing to stdout ends up on stderr.
#[derive(Debug, Clone, Copy)]
pub struct HostDefaultBootstrap<'g, F: FdOps> {
    guard: &'g OneShot,
    fds: F,
}

impl<'g, F: FdOps> HostDefaultBootstrap<'g, F> {
    pub fn new(guard: &'g OneShot, fds: F) -> Self {
        Self { guard, fds }
    }

    fn relocate(&self) -> Result<(Fd, Fd), BootstrapError> {
        let min = RELOCATE_MIN_FD;
        let input = self.fds.fcntl(STDIN_FILENO, FcntlCmd::DupFdCloexec { min })?;
        let output = self.fds.fcntl(STDOUT_FILENO, FcntlCmd::DupFdCloexec { min })?;
        self.fds.dup2(STDERR_FILENO, STDOUT_FILENO)?;
        Ok((input, output))
    }
}

impl<F: FdOps> StdioBootstrap for HostDefaultBootstrap<'_, F> {
    fn open(
        &self,
        host: &mut dyn ChannelHost,
        rpc: bool,
        on_output: CallbackReader,
        diag: &mut dyn Write,
    ) -> Result<ChannelId, BootstrapError> {
        let mode = host.runtime_mode();
        claim(self.guard, mode)?;

        let (input, output) = if mode.embedded {
            self.relocate()?
        } else {
            (STDIN_FILENO, STDOUT_FILENO)
        };

        let channel = host.channel_alloc(StreamKind::Stdio);
        channel.stdio.input.init_fd(input);
        channel.stdio.output.init_fd(output);
        let id = channel.id;

        start_handler(host, id, rpc, on_output);

        let _ = writeln!(
            diag,
            "[shim] channel_from_stdio rpc={} headless={} embedded={} id={}",
            rpc as i32, mode.headless as i32, mode.embedded as i32, id
        );
        info!("Stdio channel {} bound to fds {}/{} (rpc={})", id, input, output, rpc);
        Ok(id)
    }
}
