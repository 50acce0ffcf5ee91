//! Update rate control for state streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often an in-process subscriber wants to see state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every published change.
    Native,

    /// At most this many states per second, latest wins.
    /// `Max(0)` is treated as `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Sampling interval, or `None` when every change should be delivered.
    pub fn sample_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}
