//! Stdio channel bootstrap and POSIX emulation for sandboxed runtimes.
//!
//! On runtimes where the external transport is a pipe fixed to descriptors
//! 0 and 1, the usual startup dance of duplicating and remapping stdio
//! detaches the process from its peer. This crate provides:
//! - A stdio channel bootstrap that binds descriptors 0/1 as they are
//! - Number-preserving `dup`/`dup2`/`dup3`/`fcntl` stand-ins
//! - libuv-style environment access over the C library
//! - The host side: channel registry, stream readers and an event loop
//! - A C ABI for linking the emulation into a host built elsewhere

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod paths;
pub mod posix;

pub use bootstrap::{BootstrapError, channel_from_stdio};
pub use channel::{ChannelId, Host, RuntimeMode};
pub use config::Config;
