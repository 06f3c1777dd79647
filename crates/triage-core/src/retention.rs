use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Messages and responses are kept for 30 days by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(2_592_000);

/// Fixed-duration retention measured from creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    period: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl RetentionPolicy {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        let delta = TimeDelta::from_std(self.period).unwrap_or(TimeDelta::MAX);
        created_at
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

pub fn is_expired(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    deadline <= now
}
