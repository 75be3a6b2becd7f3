use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Server clock whose readings never go backwards, at millisecond precision.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_ms: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let prev = self.last_ms.fetch_max(wall, Ordering::AcqRel);
        let ms = prev.max(wall);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }
}
