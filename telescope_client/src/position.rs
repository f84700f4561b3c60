/*!
Last known pointing direction and its staleness.

Time is counted in communication ticks. A sample accepted during tick `k`
stays fresh through tick `k + window` and goes stale at tick
`k + window + 1` unless a newer sample arrives.
*/

use serde::{Deserialize, Serialize};
use shared::Vec3d;

/// Default number of ticks a sample stays fresh
pub const DEFAULT_STALE_AFTER_TICKS: u32 = 5;

/// One position reading taken from the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Client clock at the moment the sample was accepted, µs since the epoch
    pub timestamp_us: i64,
    /// Direction in the J2000 equatorial frame
    pub j2000: Vec3d,
}

#[derive(Debug, Clone)]
pub struct PositionTracker {
    last: Option<PositionSample>,
    ticks_since_sample: u32,
    fresh: bool,
    window: u32,
}

impl PositionTracker {
    pub fn new(window: u32) -> Self {
        Self {
            last: None,
            ticks_since_sample: 0,
            fresh: false,
            window,
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Advance one communication tick
    pub fn tick(&mut self) {
        self.ticks_since_sample = self.ticks_since_sample.saturating_add(1);
    }

    pub fn accept(&mut self, sample: PositionSample) {
        self.last = Some(sample);
        self.ticks_since_sample = 0;
        self.fresh = true;
    }

    /// Mark the current sample as no longer trustworthy; it stays readable
    pub fn invalidate(&mut self) {
        self.fresh = false;
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh && self.last.is_some() && self.ticks_since_sample <= self.window
    }

    pub fn last(&self) -> Option<&PositionSample> {
        self.last.as_ref()
    }

    pub fn ticks_since_sample(&self) -> u32 {
        self.ticks_since_sample
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_TICKS)
    }
}
