use std::sync::Arc;
use std::time::Duration;

use dcache_timestamp::Timestamp;
use parking_lot::Mutex;

/// Source of the current time for everything time-dependent in the repo.
pub trait Clock: 'static + Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Shared clock handle
pub type ArcClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<Timestamp>>);

impl ManualClock {
    /// Start at `t`
    pub fn new(t: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(t)))
    }

    /// Jump to `t`, forwards or backwards
    pub fn set(&self, t: Timestamp) {
        *self.0.lock() = t;
    }

    /// Move forward by `d`, saturating
    pub fn advance(&self, d: Duration) {
        let mut t = self.0.lock();
        *t = t.saturating_add(&d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.0.lock()
    }
}
