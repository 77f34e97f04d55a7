//! Time source abstraction for timestamp stamping

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// The context and repositories take a `Clock` at construction so that
/// `updated_at`/`deleted_at` stamping can be pinned in tests.
pub trait Clock: Send + Sync {
    /// Current date and time in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
