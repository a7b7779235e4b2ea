//! RunningAverage - Frame interval smoothing
//!
//! Fixed-window integer mean over the last N samples, plus the
//! frame-interval monitor the stream loop feeds. Diagnostics only.

use std::time::{Duration, Instant};

/// Default window size
pub const DEFAULT_WINDOW: usize = 20;

/// Fixed-capacity circular running average
#[derive(Debug, Clone)]
pub struct RunningAverageFilter {
    values: Vec<i64>,
    index: usize,
    count: usize,
    sum: i64,
}

impl RunningAverageFilter {
    /// Create a filter with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity.max(1)],
            index: 0,
            count: 0,
            sum: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of valid slots, saturating at capacity
    pub fn count(&self) -> usize {
        self.count
    }

    /// Record a sample and return the truncated mean of the valid slots
    pub fn sample(&mut self, value: i64) -> i64 {
        self.sum -= self.values[self.index];
        self.values[self.index] = value;
        self.sum += value;
        self.index = (self.index + 1) % self.values.len();
        if self.count < self.values.len() {
            self.count += 1;
        }
        self.sum / self.count as i64
    }

    /// Current mean, `None` before the first sample
    pub fn average(&self) -> Option<i64> {
        (self.count > 0).then(|| self.sum / self.count as i64)
    }
}

impl Default for RunningAverageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// One frame interval measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInterval {
    /// Milliseconds since the previous iteration finished
    pub frame_ms: i64,
    /// Running average of `frame_ms`
    pub avg_ms: i64,
}

impl FrameInterval {
    pub fn fps(&self) -> f64 {
        fps(self.frame_ms)
    }

    pub fn avg_fps(&self) -> f64 {
        fps(self.avg_ms)
    }
}

fn fps(ms: i64) -> f64 {
    if ms > 0 {
        1000.0 / ms as f64
    } else {
        0.0
    }
}

/// Frame interval tracker for the stream loop
#[derive(Debug)]
pub struct FrameRateMonitor {
    filter: RunningAverageFilter,
    last_frame: Option<Instant>,
}

impl FrameRateMonitor {
    pub fn new(window: usize) -> Self {
        Self {
            filter: RunningAverageFilter::new(window),
            last_frame: None,
        }
    }

    /// Set the baseline if none exists yet
    pub fn prime(&mut self, now: Instant) {
        self.last_frame.get_or_insert(now);
    }

    /// Record the end of an iteration at `now`.
    ///
    /// Without a baseline the interval is zero rather than time since boot.
    pub fn record(&mut self, now: Instant) -> FrameInterval {
        let last = *self.last_frame.get_or_insert(now);
        self.last_frame = Some(now);

        let frame_ms = i64::try_from(now.saturating_duration_since(last).as_millis()).unwrap_or(i64::MAX);
        let avg_ms = self.filter.sample(frame_ms);
        FrameInterval { frame_ms, avg_ms }
    }

    pub fn average(&self) -> Option<Duration> {
        self.filter
            .average()
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }
}

impl Default for FrameRateMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
