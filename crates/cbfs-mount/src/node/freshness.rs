use std::time::{Duration, Instant, SystemTime};

/// When a cached node was last filled from the store, and whether it has
/// been explicitly invalidated since.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Freshness {
    fetched_at: Instant,
    fetched_wall: SystemTime,
    force_stale: bool,
}

impl Freshness {
    pub fn now() -> Self {
        Self {
            fetched_at: Instant::now(),
            fetched_wall: SystemTime::now(),
            force_stale: false,
        }
    }

    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.force_stale || self.fetched_at.elapsed() > stale_after
    }

    pub fn invalidate(&mut self) {
        self.force_stale = true;
    }

    pub fn fetched_wall(&self) -> SystemTime {
        self.fetched_wall
    }
}
