use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Process-wide allocator for analysis serial numbers.
///
/// Serials keep the original `yyyyMMddHHmmss` shape so they stay
/// human-readable and roughly sortable by save time, but assignment is
/// monotonic: each serial is `max(clock_serial, last + 1)`, so two saves
/// inside the same clock second can never collide. Re-seed above the table
/// maximum at startup to stay ahead of earlier runs.
pub struct SerialAllocator {
    last: AtomicI64,
}

impl SerialAllocator {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Raises the floor so no future serial is <= `floor`.
    pub fn reseed_above(&self, floor: i64) {
        self.last.fetch_max(floor, Ordering::SeqCst);
    }

    pub fn allocate(&self) -> i64 {
        self.allocate_at(Utc::now())
    }

    fn allocate_at(&self, now: DateTime<Utc>) -> i64 {
        let candidate = clock_serial(now);
        loop {
            let last = self.last.load(Ordering::SeqCst);
            let next = candidate.max(last + 1);
            if self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_serial(now: DateTime<Utc>) -> i64 {
    now.format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or_else(|_| now.timestamp())
}
