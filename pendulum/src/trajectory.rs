//! Append-only record of one run.

use serde::Serialize;

/// One logged step. All quantities are raw radians / seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectorySample {
    pub time: f64,
    pub angle: f64,
    pub angular_velocity: f64,
}

impl TrajectorySample {
    #[inline]
    pub fn new(time: f64, angle: f64, angular_velocity: f64) -> Self {
        Self { time, angle, angular_velocity }
    }
}

/// Ordered samples for a single run.
///
/// Insertion order is time order; the run loop is the only writer and it
/// appends once per step, so ordering holds by construction.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryLog {
    samples: Vec<TrajectorySample>,
}

impl TrajectoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate for a run of known rough length.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { samples: Vec::with_capacity(capacity) }
    }

    #[inline]
    pub fn append(&mut self, sample: TrajectorySample) {
        debug_assert!(
            self.samples.last().is_none_or(|last| last.time < sample.time),
            "trajectory samples must be appended in increasing time"
        );
        self.samples.push(sample);
    }

    /// Copy of everything logged so far. The log keeps accepting appends.
    pub fn snapshot(&self) -> Vec<TrajectorySample> {
        self.samples.clone()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Column views used by the plot renderer.
pub trait SampleSeries {
    fn times(&self) -> Vec<f64>;
    fn angles(&self) -> Vec<f64>;
    fn angular_velocities(&self) -> Vec<f64>;
}

impl SampleSeries for [TrajectorySample] {
    fn times(&self) -> Vec<f64> {
        self.iter().map(|s| s.time).collect()
    }

    fn angles(&self) -> Vec<f64> {
        self.iter().map(|s| s.angle).collect()
    }

    fn angular_velocities(&self) -> Vec<f64> {
        self.iter().map(|s| s.angular_velocity).collect()
    }
}
