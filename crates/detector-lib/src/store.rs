//! Per-metric sample history and streak counters
//!
//! Each metric owns a bounded ring of its most recent values (oldest evicted
//! first) plus two counters used by the control loop:
//! - a duration streak in seconds for `window_threshold`
//! - a hit counter for detectors configured with `consecutive > 1`
//!
//! Nothing here is persisted; a restart starts every window empty.

use crate::anomaly::{DetectionInput, Evaluation};
use crate::models::Detection;
use std::collections::{HashMap, VecDeque};

/// Default number of samples kept per metric
pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

/// History and counters for one metric
#[derive(Debug, Clone)]
pub struct SampleWindow {
    values: VecDeque<f64>,
    capacity: usize,
    streak_secs: u64,
    hits: u32,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            streak_secs: 0,
            hits: 0,
        }
    }

    /// Push a value, evicting the oldest once at capacity
    pub fn push(&mut self, value: f64) {
        while self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
        // Keep the ring in one slice so history can be lent out without copying
        self.values.make_contiguous();
    }

    /// Values in chronological order, oldest first
    pub fn as_slice(&self) -> &[f64] {
        let (front, back) = self.values.as_slices();
        debug_assert!(back.is_empty(), "sample ring is not contiguous");
        front
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn streak_secs(&self) -> u64 {
        self.streak_secs
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }
}

/// Result of feeding one sample through a metric's detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub evaluation: Evaluation,
    /// Consecutive positive detector results, including this one
    pub hits: u32,
    /// Fired, and has fired at least `consecutive` ticks in a row
    pub detected: bool,
}

/// Sample windows for every monitored metric
#[derive(Debug)]
pub struct SampleStore {
    capacity: usize,
    poll_interval_secs: u64,
    windows: HashMap<String, SampleWindow>,
}

impl SampleStore {
    pub fn new(capacity: usize, poll_interval_secs: u64) -> Self {
        Self {
            capacity,
            poll_interval_secs,
            windows: HashMap::new(),
        }
    }

    fn window_mut(&mut self, metric: &str) -> &mut SampleWindow {
        let capacity = self.capacity;
        self.windows
            .entry(metric.to_string())
            .or_insert_with(|| SampleWindow::new(capacity))
    }

    /// Append a sample for a metric
    pub fn append(&mut self, metric: &str, value: f64) {
        self.window_mut(metric).push(value);
    }

    /// Chronological history for a metric (empty if never sampled)
    pub fn history(&self, metric: &str) -> &[f64] {
        self.windows
            .get(metric)
            .map(SampleWindow::as_slice)
            .unwrap_or(&[])
    }

    pub fn window(&self, metric: &str) -> Option<&SampleWindow> {
        self.windows.get(metric)
    }

    /// Extend the streak by one poll interval if the condition holds, otherwise
    /// reset it. Returns the new streak in seconds.
    pub fn increment_streak(&mut self, metric: &str, condition_holds: bool) -> u64 {
        let step = self.poll_interval_secs;
        let window = self.window_mut(metric);
        window.streak_secs = if condition_holds {
            window.streak_secs.saturating_add(step)
        } else {
            0
        };
        window.streak_secs
    }

    pub fn streak(&self, metric: &str) -> u64 {
        self.windows.get(metric).map_or(0, |w| w.streak_secs)
    }

    /// Count a positive detector result, or reset on a negative one.
    /// Returns the number of consecutive positive results.
    pub fn record_hit(&mut self, metric: &str, fired: bool) -> u32 {
        let window = self.window_mut(metric);
        window.hits = if fired {
            window.hits.saturating_add(1)
        } else {
            0
        };
        window.hits
    }

    /// Append `value`, advance the streak and hit counters, and run `detection`
    /// against the updated history
    pub fn observe(&mut self, metric: &str, detection: &Detection, value: f64) -> Observation {
        self.append(metric, value);

        let streak_secs = match detection.streak_condition(value) {
            Some(holds) => self.increment_streak(metric, holds),
            None => 0,
        };

        let evaluation = detection.evaluate(&DetectionInput {
            value,
            history: self.history(metric),
            streak_secs,
            poll_step_secs: self.poll_interval_secs,
        });

        let hits = self.record_hit(metric, evaluation.fired);
        Observation {
            evaluation,
            hits,
            detected: evaluation.fired && hits >= detection.consecutive(),
        }
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, 15)
    }
}
