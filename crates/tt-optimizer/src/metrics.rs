//! Metric registry used to rebuild evaluators from checkpoint metadata.

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tt_types::{Metric, ModelOutput, RestartError, TuneResult};

type MetricConstructor =
    Box<dyn Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Metric>> + Send + Sync>;

/// Maps a metric name to a constructor taking its stored attributes.
pub struct MetricRegistry {
    constructors: HashMap<String, MetricConstructor>,
}

impl MetricRegistry {
    /// A registry with no metrics.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<Box<dyn Metric>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Rebuild a metric from its name and attributes.
    pub fn build(&self, name: &str, attributes: &serde_json::Value) -> TuneResult<Box<dyn Metric>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| RestartError::UnknownMetric {
                name: name.to_string(),
            })?;
        constructor(attributes).map_err(|e| {
            RestartError::MalformedField {
                field: format!("attributes of {name}"),
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TopicDiversity::NAME, |attributes| {
            Ok(Box::new(TopicDiversity::from_attributes(attributes)?) as Box<dyn Metric>)
        });
        registry
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("MetricRegistry").field("metrics", &names).finish()
    }
}

/// Share of distinct words among the top-k words of every topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDiversity {
    pub topk: usize,
}

impl TopicDiversity {
    pub const NAME: &'static str = "TopicDiversity";

    pub fn new(topk: usize) -> Self {
        Self { topk }
    }

    fn from_attributes(attributes: &serde_json::Value) -> anyhow::Result<Self> {
        if attributes.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(attributes.clone())?)
    }
}

impl Default for TopicDiversity {
    fn default() -> Self {
        Self { topk: 10 }
    }
}

impl Metric for TopicDiversity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn attributes(&self) -> serde_json::Value {
        serde_json::json!({ "topk": self.topk })
    }

    fn score(&self, output: &ModelOutput) -> anyhow::Result<f64> {
        let topics = output
            .topics
            .as_ref()
            .ok_or_else(|| anyhow!("model output has no topics"))?;
        if topics.is_empty() || self.topk == 0 {
            bail!("topic diversity needs at least one topic and topk > 0");
        }
        if let Some(short) = topics.iter().find(|t| t.len() < self.topk) {
            bail!("topic has {} words, fewer than topk={}", short.len(), self.topk);
        }
        let unique: BTreeSet<&String> = topics.iter().flat_map(|t| &t[..self.topk]).collect();
        Ok(unique.len() as f64 / (self.topk * topics.len()) as f64)
    }
}
