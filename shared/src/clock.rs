/*!
Microsecond timestamp source.

Position samples are stamped with microseconds since the Unix epoch. The
system clock anchors the wall-clock time once per process and then advances
with [`Instant`], so timestamps never run backwards even if the system time
is adjusted.
*/

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Source of microsecond timestamps
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch
    fn now_micros(&self) -> i64;
}

struct Anchor {
    wall_micros: i64,
    instant: Instant,
}

fn anchor() -> &'static Anchor {
    static ANCHOR: OnceLock<Anchor> = OnceLock::new();
    ANCHOR.get_or_init(|| Anchor {
        wall_micros: Utc::now().timestamp_micros(),
        instant: Instant::now(),
    })
}

/// Current time in microseconds since the Unix epoch, monotonic within the process
pub fn now_micros() -> i64 {
    let anchor = anchor();
    anchor.wall_micros + anchor.instant.elapsed().as_micros() as i64
}

/// Clock backed by [`now_micros`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        now_micros()
    }
}

/// Manually driven clock for tests and replay
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `micros`
    pub fn new(micros: i64) -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(micros)),
        }
    }

    pub fn set(&self, micros: i64) {
        self.micros.store(micros, Ordering::SeqCst);
    }

    /// Move the clock forward by `micros`
    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}
