//! Iteration bounds for simulation runs.

use serde::{Deserialize, Serialize};

/// The timesteps a run iterates over: `count` steps beginning at `start`.
///
/// # Examples
///
/// ```
/// use simexec::TimeRange;
///
/// let range = TimeRange::new(0, 3);
/// assert_eq!(range.len(), 3);
/// assert_eq!(range.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First timestep index.
    pub start: u64,
    /// Number of timesteps.
    pub count: u64,
}

impl TimeRange {
    /// Creates a range of `count` timesteps starting at `start`.
    #[must_use]
    pub const fn new(start: u64, count: u64) -> Self {
        Self { start, count }
    }

    /// Creates a range of `count` timesteps starting at zero.
    #[must_use]
    pub const fn steps(count: u64) -> Self {
        Self { start: 0, count }
    }

    /// Number of timesteps in the range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.count
    }

    /// Returns true if the range has no timesteps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates the timestep indices in order.
    ///
    /// The end is saturated at `u64::MAX`.
    pub fn iter(&self) -> std::ops::Range<u64> {
        self.start..self.start.saturating_add(self.count)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::steps(1)
    }
}
