//! Process-level bootstrap behaviour. Everything touching the global guard
//! lives in one test so the order of calls is fixed.

#![cfg(feature = "stdio-override")]

use wasi_stdio_shim::bootstrap::STDIO_GUARD;
use wasi_stdio_shim::channel::{CallbackReader, ChannelId, Host, RuntimeMode, StreamKind};
use wasi_stdio_shim::channel_from_stdio;

#[test]
fn stdio_channel_opens_once_in_owning_modes() {
    let mut interactive = Host::new(RuntimeMode::default());
    let mut error = None;
    let id = channel_from_stdio(&mut interactive, true, CallbackReader::none(), &mut error);
    assert_eq!(id, ChannelId::INVALID);
    assert_eq!(error.as_deref(), Some("can only be opened in headless mode"));
    assert!(!STDIO_GUARD.is_claimed());

    let mut embedded = Host::new(RuntimeMode {
        headless: false,
        embedded: true,
    });
    let mut error = None;
    let id = channel_from_stdio(&mut embedded, true, CallbackReader::none(), &mut error);
    assert!(id.is_valid(), "unexpected error: {:?}", error);
    assert!(error.is_none());
    assert!(STDIO_GUARD.is_claimed());

    let channel = embedded.channel(id).unwrap();
    assert_eq!(channel.kind, StreamKind::Stdio);
    assert_eq!(channel.stdio.input.fd(), Some(0));
    assert_eq!(channel.stdio.output.fd(), Some(1));
    assert!(channel.is_rpc());

    let mut error = None;
    let again = channel_from_stdio(&mut embedded, false, CallbackReader::none(), &mut error);
    assert_eq!(again, ChannelId::INVALID);
    assert_eq!(error.as_deref(), Some("channel was already open"));

    // A fresh host does not reset the process-wide guard.
    let mut headless = Host::new(RuntimeMode {
        headless: true,
        embedded: false,
    });
    let mut error = None;
    let third = channel_from_stdio(&mut headless, true, CallbackReader::none(), &mut error);
    assert_eq!(third, ChannelId::INVALID);
    assert_eq!(error.as_deref(), Some("channel was already open"));
}
