//! Deterministic fakes shared by unit tests.

use anyhow::bail;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tt_types::{
    Candidate, Dataset, Hyperparameters, Metric, ModelOutput, OutputOptions, TopicModel,
    TuneResult,
};

use crate::backend::{BackendFactory, BackendSpec, SurrogateBackend, TellResult};

pub fn dataset() -> Dataset {
    let corpus = [
        "topic models find latent themes",
        "bayesian optimization tunes hyperparameters",
        "latent dirichlet allocation is a topic model",
    ]
    .iter()
    .map(|doc| doc.split_whitespace().map(str::to_string).collect())
    .collect();
    Dataset::new("toy", corpus)
}

/// Model whose output encodes its hyperparameters: `topic_word_matrix[0][0]`
/// is the sum of the numeric values. Fails once `fail_after` trainings ran.
pub struct ScriptedModel {
    seen: Arc<Mutex<Vec<Hyperparameters>>>,
    fail_after: Option<usize>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
        }
    }

    pub fn failing_after(trainings: usize) -> Self {
        Self {
            fail_after: Some(trainings),
            ..Self::new()
        }
    }

    /// Every hyperparameter mapping this model was trained with.
    pub fn seen(&self) -> Arc<Mutex<Vec<Hyperparameters>>> {
        Arc::clone(&self.seen)
    }
}

impl TopicModel for ScriptedModel {
    fn train_model(
        &self,
        _dataset: &Dataset,
        hyperparameters: &Hyperparameters,
        _output: &OutputOptions,
    ) -> anyhow::Result<ModelOutput> {
        let mut seen = self.seen.lock().unwrap();
        if self.fail_after.is_some_and(|n| seen.len() >= n) {
            bail!("training diverged");
        }
        seen.push(hyperparameters.clone());

        let value: f64 = hyperparameters.values().filter_map(|v| v.as_f64()).sum();
        let topics = (0..2)
            .map(|t| (0..10).map(|w| format!("w{}", t * 5 + w)).collect())
            .collect();
        Ok(ModelOutput {
            topics: Some(topics),
            topic_word_matrix: Some(vec![vec![value]]),
            topic_document_matrix: None,
        })
    }

    fn name(&self) -> &str {
        "ScriptedModel"
    }
}

/// Metric returning a fixed sequence of scores, cycling when exhausted.
pub struct ScriptedMetric {
    name: String,
    scores: Vec<f64>,
    calls: AtomicUsize,
}

impl ScriptedMetric {
    pub fn new(name: &str, scores: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(name: &str, score: f64) -> Self {
        Self::new(name, vec![score])
    }
}

impl Metric for ScriptedMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, _output: &ModelOutput) -> anyhow::Result<f64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores[call % self.scores.len()])
    }
}

/// Metric reading back the value [`ScriptedModel`] encoded.
pub struct EchoMetric;

impl EchoMetric {
    pub const NAME: &'static str = "Echo";
}

impl Metric for EchoMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn score(&self, output: &ModelOutput) -> anyhow::Result<f64> {
        match output.topic_word_matrix.as_ref().and_then(|m| m.first()?.first()) {
            Some(value) => Ok(*value),
            None => bail!("no encoded value"),
        }
    }
}

/// Counters shared between a [`ScriptedBackend`] and the test body.
#[derive(Clone, Default)]
pub struct BackendLog {
    pub asks: Arc<AtomicUsize>,
    pub tells: Arc<Mutex<Vec<(Candidate, f64)>>>,
}

impl BackendLog {
    pub fn asks(&self) -> usize {
        self.asks.load(Ordering::SeqCst)
    }

    pub fn tells(&self) -> Vec<(Candidate, f64)> {
        self.tells.lock().unwrap().clone()
    }
}

/// Backend proposing a fixed cycle of candidates and logging every call.
pub struct ScriptedBackend {
    proposals: Vec<Candidate>,
    log: BackendLog,
    x_iters: Vec<Candidate>,
    func_vals: Vec<f64>,
}

impl SurrogateBackend for ScriptedBackend {
    fn ask(&mut self) -> TuneResult<Candidate> {
        let call = self.log.asks.fetch_add(1, Ordering::SeqCst);
        Ok(self.proposals[call % self.proposals.len()].clone())
    }

    fn tell(&mut self, candidate: Candidate, value: f64) -> TuneResult<TellResult> {
        self.log.tells.lock().unwrap().push((candidate.clone(), value));
        self.x_iters.push(candidate);
        self.func_vals.push(value);
        let best = self
            .func_vals
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Ok(TellResult {
            best_value: self.func_vals[best],
            best_candidate: self.x_iters[best].clone(),
            func_vals: self.func_vals.clone(),
        })
    }

    fn x_iters(&self) -> &[Candidate] {
        &self.x_iters
    }

    fn func_vals(&self) -> &[f64] {
        &self.func_vals
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Factory handing out [`ScriptedBackend`]s that share one log.
pub struct ScriptedFactory {
    pub proposals: Vec<Candidate>,
    pub log: BackendLog,
    pub specs: Arc<Mutex<Vec<BackendSpec>>>,
}

impl ScriptedFactory {
    pub fn new(proposals: Vec<Candidate>) -> Self {
        Self {
            proposals,
            log: BackendLog::default(),
            specs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl BackendFactory for ScriptedFactory {
    fn build(&self, spec: &BackendSpec) -> TuneResult<Box<dyn SurrogateBackend>> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(Box::new(ScriptedBackend {
            proposals: self.proposals.clone(),
            log: self.log.clone(),
            x_iters: Vec::new(),
            func_vals: Vec::new(),
        }))
    }
}
