//! Clock abstraction so engines can be tested at a fixed instant.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests.
#[cfg(feature = "test-utils")]
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

#[cfg(feature = "test-utils")]
impl FixedClock {
    /// Create a clock pinned at the given instant.
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            time: std::sync::Arc::new(std::sync::Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned, which cannot happen
    /// outside of a panicking test.
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.time.lock().unwrap();
        *guard += by;
    }
}

#[cfg(feature = "test-utils")]
impl Clock for FixedClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}
