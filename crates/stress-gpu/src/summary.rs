//! Run history aggregation

use crate::history::{RunHistory, Sample};
use serde::{Deserialize, Serialize};

/// Min/max/average over the present values of one telemetry field
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl Stats {
    /// Aggregate `values`; all fields are absent when there are none.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return Self::default();
        }

        Self {
            min: Some(min),
            max: Some(max),
            avg: Some(sum / count as f64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.avg.is_none()
    }
}

/// Statistics of a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub temperature: Stats,
    pub utilization: Stats,
    /// Elapsed time of the last sample
    pub duration_seconds: Option<f64>,
    /// Number of samples aggregated
    pub samples: usize,
}

/// Reduce a run history to per-field statistics.
pub fn summarize(history: &RunHistory) -> Summary {
    summarize_samples(history.samples())
}

pub(crate) fn summarize_samples(samples: &[Sample]) -> Summary {
    Summary {
        temperature: Stats::from_values(samples.iter().filter_map(|s| s.temperature)),
        utilization: Stats::from_values(samples.iter().filter_map(|s| s.utilization)),
        duration_seconds: samples.last().map(|s| s.elapsed_seconds),
        samples: samples.len(),
    }
}
