//! Injectable clock used by refreshable credentials and fetchers.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Production code uses [`TimeSource::system`]; tests inject a fixed or
/// hand-rolled clock so expiry-window behavior is deterministic.
#[derive(Clone)]
pub struct TimeSource {
    inner: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl TimeSource {
    /// The system clock.
    pub fn system() -> Self {
        Self {
            inner: Arc::new(Utc::now),
        }
    }

    /// A clock that always returns `at`.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(move || at),
        }
    }

    /// A clock backed by an arbitrary closure.
    pub fn from_fn(f: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    /// Current time according to this source.
    pub fn now(&self) -> DateTime<Utc> {
        (self.inner)()
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSource").finish_non_exhaustive()
    }
}
