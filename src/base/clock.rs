//! Wall-clock access.
//!
//! Every "how long ago was this" computation goes through a [`Clock`] so that
//! the timing rules can be exercised against tokio's paused clock in tests.

use std::{ops::Deref, sync::Arc};

use chrono::{DateTime, Utc};

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock handle.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ClockHandle {
    inner: Arc<dyn Clock>,
}

impl Deref for ClockHandle {
    type Target = dyn Clock;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ClockHandle {
    pub fn new(inner: Arc<dyn Clock>) -> Self {
        Self { inner }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Positive duration from `earlier` to `later`, or zero if `later` is not after `earlier`.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> std::time::Duration {
    (later - earlier).to_std().unwrap_or_default()
}
