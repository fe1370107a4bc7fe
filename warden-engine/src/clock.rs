//! Logical clock supplied by the host.

use std::sync::atomic::{AtomicU64, Ordering};

use warden_core::Height;

/// A monotonically increasing height counter, read-only to the marketplace.
pub trait Clock: Send + Sync {
    /// The current height.
    fn height(&self) -> Height;
}

/// A clock advanced by hand. Used by simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    height: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `height`.
    #[must_use]
    pub fn new(height: Height) -> Self {
        Self { height: AtomicU64::new(height) }
    }

    /// Advance by `blocks` heights and return the new height.
    pub fn advance(&self, blocks: Height) -> Height {
        self.height.fetch_add(blocks, Ordering::SeqCst) + blocks
    }
}

impl Clock for ManualClock {
    fn height(&self) -> Height {
        self.height.load(Ordering::SeqCst)
    }
}
