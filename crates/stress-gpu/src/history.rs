//! Run samples and history

use serde::{Deserialize, Serialize};

/// Telemetry recorded after one kernel burst
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the run started
    pub elapsed_seconds: f64,

    /// Device temperature in °C, if the probe returned one
    pub temperature: Option<f64>,

    /// Device utilization in %, if the probe returned one
    pub utilization: Option<f64>,
}

/// Ordered samples of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHistory {
    samples: Vec<Sample>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample; rejected unless strictly later than the last one.
    pub fn push(&mut self, sample: Sample) -> bool {
        if let Some(last) = self.samples.last() {
            if !(sample.elapsed_seconds > last.elapsed_seconds) {
                return false;
            }
        }
        self.samples.push(sample);
        true
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Render as CSV; absent readings are empty cells.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("elapsed_seconds,temperature,utilization\n");

        for sample in &self.samples {
            csv.push_str(&format!(
                "{:.3},{},{}\n",
                sample.elapsed_seconds,
                sample.temperature.map(|t| format!("{:.1}", t)).unwrap_or_default(),
                sample.utilization.map(|u| format!("{:.1}", u)).unwrap_or_default(),
            ));
        }

        csv
    }
}

impl FromIterator<Sample> for RunHistory {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut history = RunHistory::new();
        for sample in iter {
            history.push(sample);
        }
        history
    }
}

impl<'a> IntoIterator for &'a RunHistory {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, temp: Option<f64>, util: Option<f64>) -> Sample {
        Sample {
            elapsed_seconds: t,
            temperature: temp,
            utilization: util,
        }
    }

    #[test]
    fn test_push_requires_increasing_elapsed() {
        let mut history = RunHistory::new();
        assert!(history.push(sample(0.5, None, None)));
        assert!(history.push(sample(1.0, None, None)));
        assert!(!history.push(sample(1.0, None, None)));
        assert!(!history.push(sample(0.7, None, None)));
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().elapsed_seconds, 1.0);
    }

    #[test]
    fn test_to_csv_leaves_absent_cells_empty() {
        let history: RunHistory = vec![
            sample(0.25, Some(61.0), Some(98.0)),
            sample(0.5, None, Some(97.0)),
            sample(0.75, Some(62.0), None),
        ]
        .into_iter()
        .collect();

        let csv = history.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "elapsed_seconds,temperature,utilization");
        assert_eq!(lines[1], "0.250,61.0,98.0");
        assert_eq!(lines[2], "0.500,,97.0");
        assert_eq!(lines[3], "0.750,62.0,");
    }

    #[test]
    fn test_history_serializes_as_list() {
        let history: RunHistory = vec![sample(1.0, Some(50.0), None)].into_iter().collect();
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["temperature"], 50.0);
        assert!(json[0]["utilization"].is_null());
    }
}
