//! Per-metric record of every raw score at every iteration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tt_types::{internal_error, TuneResult};

const ITERATION_PREFIX: &str = "iteration_";

/// Key under which iteration `i` is stored.
pub fn iteration_key(iteration: usize) -> String {
    format!("{ITERATION_PREFIX}{iteration}")
}

fn parse_iteration_key(key: &str) -> Option<usize> {
    key.strip_prefix(ITERATION_PREFIX)?.parse().ok()
}

/// Append-only run history: metric name -> iteration -> raw scores, one per
/// repeated model run. Iterations are contiguous from 0 for every metric.
///
/// Not every iteration holds `model_runs` scores: a seed point with a known
/// score stores that single value for the primary metric and an empty list for
/// extra metrics, and metrics added on restart are back-filled with empty
/// lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawHistory", into = "RawHistory")]
pub struct RunHistory {
    metrics: BTreeMap<String, Vec<Vec<f64>>>,
}

/// Checkpoint layout: `{"<metric>": {"iteration_<i>": [scores..]}}`.
type RawHistory = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a metric. Re-registering keeps existing scores.
    pub fn register(&mut self, metric: &str) {
        self.metrics.entry(metric.to_string()).or_default();
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.metrics.contains_key(metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Number of iterations recorded for `metric`.
    pub fn iterations(&self, metric: &str) -> usize {
        self.metrics.get(metric).map_or(0, Vec::len)
    }

    pub fn get(&self, metric: &str, iteration: usize) -> Option<&[f64]> {
        self.metrics
            .get(metric)?
            .get(iteration)
            .map(Vec::as_slice)
    }

    /// Append the scores of `iteration`, which must be the next one for `metric`.
    pub fn record(&mut self, metric: &str, iteration: usize, scores: Vec<f64>) -> TuneResult<()> {
        let runs = self.metrics.entry(metric.to_string()).or_default();
        if iteration != runs.len() {
            return Err(internal_error!(
                "run history for {} expects {}, got {}",
                metric,
                iteration_key(runs.len()),
                iteration_key(iteration)
            ));
        }
        runs.push(scores);
        Ok(())
    }

    /// Pad `metric` with empty score lists up to `iterations` entries.
    pub fn backfill(&mut self, metric: &str, iterations: usize) {
        let runs = self.metrics.entry(metric.to_string()).or_default();
        while runs.len() < iterations {
            runs.push(Vec::new());
        }
    }

    /// Named view, as written to checkpoints.
    pub fn to_map(&self) -> RawHistory {
        self.metrics
            .iter()
            .map(|(metric, runs)| {
                let iterations = runs
                    .iter()
                    .enumerate()
                    .map(|(i, scores)| (iteration_key(i), scores.clone()))
                    .collect();
                (metric.clone(), iterations)
            })
            .collect()
    }
}

impl From<RunHistory> for RawHistory {
    fn from(history: RunHistory) -> Self {
        history.to_map()
    }
}

impl TryFrom<RawHistory> for RunHistory {
    type Error = String;

    fn try_from(raw: RawHistory) -> Result<Self, Self::Error> {
        let mut metrics = BTreeMap::new();
        for (metric, iterations) in raw {
            let mut indexed = BTreeMap::new();
            for (key, scores) in iterations {
                let i = parse_iteration_key(&key)
                    .ok_or_else(|| format!("{metric}: bad iteration key {key:?}"))?;
                indexed.insert(i, scores);
            }
            if let Some((i, _)) = indexed.keys().enumerate().find(|(pos, i)| pos != *i) {
                return Err(format!("{metric}: missing {}", iteration_key(i)));
            }
            metrics.insert(metric, indexed.into_values().collect());
        }
        Ok(Self { metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_is_append_only() {
        let mut history = RunHistory::new();
        history.record("Coherence", 0, vec![0.1, 0.2]).unwrap();
        history.record("Coherence", 1, vec![0.3, 0.4]).unwrap();
        assert_eq!(history.iterations("Coherence"), 2);
        assert_eq!(history.get("Coherence", 1), Some(&[0.3, 0.4][..]));

        // Gaps and rewrites are both rejected.
        assert!(history.record("Coherence", 3, vec![]).is_err());
        assert!(history.record("Coherence", 0, vec![]).is_err());
    }

    #[test]
    fn serializes_with_iteration_labels() {
        let mut history = RunHistory::new();
        history.record("TopicDiversity", 0, vec![0.5]).unwrap();
        history.record("TopicDiversity", 1, vec![0.6]).unwrap();
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(
            value,
            json!({"TopicDiversity": {"iteration_0": [0.5], "iteration_1": [0.6]}})
        );
    }

    #[test]
    fn deserialize_orders_numerically() {
        let mut raw = serde_json::Map::new();
        let mut iterations = serde_json::Map::new();
        for i in 0..12 {
            iterations.insert(iteration_key(i), json!([i as f64]));
        }
        raw.insert("m".into(), serde_json::Value::Object(iterations));
        let history: RunHistory = serde_json::from_value(serde_json::Value::Object(raw)).unwrap();
        assert_eq!(history.iterations("m"), 12);
        assert_eq!(history.get("m", 10), Some(&[10.0][..]));
        assert_eq!(history.get("m", 2), Some(&[2.0][..]));
    }

    #[test]
    fn deserialize_rejects_gaps() {
        let gap = json!({"m": {"iteration_0": [1.0], "iteration_2": [2.0]}});
        let err = serde_json::from_value::<RunHistory>(gap).unwrap_err();
        assert!(err.to_string().contains("iteration_1"));

        let bad_key = json!({"m": {"iter0": [1.0]}});
        assert!(serde_json::from_value::<RunHistory>(bad_key).is_err());
    }

    #[test]
    fn backfill_pads_new_metrics() {
        let mut history = RunHistory::new();
        history.backfill("Extra", 3);
        assert_eq!(history.iterations("Extra"), 3);
        assert_eq!(history.get("Extra", 2), Some(&[][..]));
        history.record("Extra", 3, vec![1.0]).unwrap();
    }
}
