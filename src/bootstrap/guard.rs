use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be claimed exactly once for the life of the process.
#[derive(Debug, Default)]
pub struct OneShot(AtomicBool);

impl OneShot {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` for the first caller only.
    pub fn try_claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Set once the process's stdio has been handed to a channel.
pub static STDIO_GUARD: OneShot = OneShot::new();
