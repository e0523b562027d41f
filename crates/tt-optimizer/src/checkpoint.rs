//! Checkpoint document, atomic persistence and field-wise loading for restart.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tt_types::{
    internal_error, AcquisitionFunction, Dataset, Hyperparameters, InitialPointGenerator, Kernel,
    Metric, OptimizationType, OutputOptions, ParameterValue, RestartError, SurrogateModel,
    TuneResult,
};
use uuid::Uuid;

use crate::backend::BackendFactory;
use crate::config::OptimizerConfig;
use crate::history::RunHistory;
use crate::metrics::MetricRegistry;
use crate::state::StopReason;

/// Current checkpoint layout version.
pub const FORMAT_VERSION: u32 = 1;

/// Full state of a run, written at the save cadence and returned as the
/// final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEvaluation {
    pub format_version: u32,
    pub run_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub current_call: usize,
    /// Hyperparameter names in canonical order.
    pub hyperparameters: Vec<String>,
    /// Evaluated values per hyperparameter, one entry per iteration.
    pub x_iters: BTreeMap<String, Vec<ParameterValue>>,
    /// Aggregated objective values in minimize convention.
    pub func_vals: Vec<f64>,
    /// Aggregated objective values in the configured direction.
    pub f_val: Vec<f64>,
    pub x_best: Option<Hyperparameters>,
    /// Best value in the configured direction.
    pub f_best: Option<f64>,
    pub times: Vec<f64>,
    pub dict_model_runs: RunHistory,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub model_name: String,
    pub dataset_name: String,
    pub dataset_path: Option<String>,
    pub metric_name: String,
    pub metric_attributes: Value,
    pub extra_metric_names: Vec<String>,
    pub extra_metric_attributes: Vec<Value>,
    #[serde(flatten)]
    pub config: OptimizerConfig,
}

/// Write `report` as pretty JSON. The file is replaced atomically so a crash
/// never leaves a truncated checkpoint behind.
pub fn save(report: &BestEvaluation, path: &Path) -> TuneResult<()> {
    let bytes = serde_json::to_vec_pretty(report)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| internal_error!("checkpoint path {} has no file name", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()));

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// A loaded checkpoint, kept as raw JSON so each field can be resolved (or
/// overridden) on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    path: Option<PathBuf>,
    fields: Map<String, Value>,
}

impl Checkpoint {
    pub fn load<P: AsRef<Path>>(path: P) -> TuneResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut checkpoint = Self::from_value(serde_json::from_str(&text)?)?;
        checkpoint.path = Some(path.to_path_buf());
        Ok(checkpoint)
    }

    pub fn from_value(value: Value) -> TuneResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { path: None, fields }),
            other => Err(RestartError::MalformedField {
                field: "checkpoint".into(),
                message: format!("expected a JSON object, found {other}"),
            }
            .into()),
        }
    }

    pub fn from_report(report: &BestEvaluation) -> TuneResult<Self> {
        Self::from_value(serde_json::to_value(report)?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A field, if present. Present but malformed is an error.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> TuneResult<Option<T>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                RestartError::MalformedField {
                    field: name.to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn require<T: DeserializeOwned>(&self, name: &str) -> TuneResult<T> {
        self.field(name)?.ok_or_else(|| {
            RestartError::MissingField {
                field: name.to_string(),
            }
            .into()
        })
    }

    /// The caller's override, or else the stored field.
    pub fn resolve<T: DeserializeOwned>(&self, value: Option<T>, name: &str) -> TuneResult<T> {
        match value {
            Some(value) => Ok(value),
            None => self.require(name),
        }
    }

    /// Parse the whole document.
    pub fn evaluation(&self) -> TuneResult<BestEvaluation> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            RestartError::MalformedField {
                field: "checkpoint".into(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Caller overrides for a restart. Every `None` falls back to the checkpoint.
#[derive(Default)]
pub struct RestartOptions {
    pub optimization_type: Option<OptimizationType>,
    pub surrogate_model: Option<SurrogateModel>,
    pub acq_func: Option<AcquisitionFunction>,
    pub kernel: Option<Kernel>,
    pub initial_point_generator: Option<InitialPointGenerator>,
    pub random_state: Option<u64>,
    pub n_random_starts: Option<usize>,
    pub model_runs: Option<usize>,
    pub save_models: Option<bool>,
    pub save_step: Option<usize>,
    pub save_name: Option<String>,
    pub save_path: Option<String>,
    pub early_stop: Option<bool>,
    pub early_step: Option<usize>,
    pub plot_model: Option<bool>,
    pub plot_best_seen: Option<bool>,
    pub plot_name: Option<String>,
    pub log_scale_plot: Option<bool>,
    pub parallel_model_runs: Option<bool>,
    pub output: Option<OutputOptions>,
    /// Replaces the metric rebuilt from `metric_name`.
    pub metric: Option<Box<dyn Metric>>,
    /// Replaces the extra metrics rebuilt from `extra_metric_names`.
    pub extra_metrics: Option<Vec<Box<dyn Metric>>>,
    /// Replaces the dataset reloaded from `dataset_path`.
    pub dataset: Option<Dataset>,
    pub registry: MetricRegistry,
    pub backend_factory: Option<Box<dyn BackendFactory>>,
}

impl RestartOptions {
    pub fn with_metric(mut self, metric: Box<dyn Metric>) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_extra_metrics(mut self, extra_metrics: Vec<Box<dyn Metric>>) -> Self {
        self.extra_metrics = Some(extra_metrics);
        self
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_registry(mut self, registry: MetricRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_backend_factory(mut self, factory: Box<dyn BackendFactory>) -> Self {
        self.backend_factory = Some(factory);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use tt_types::{SearchSpace, TuneError};

    fn report() -> BestEvaluation {
        let space = SearchSpace::new()
            .add_real("alpha", 0.01, 1.0)
            .add_int("num_topics", 5, 50);
        let config = OptimizerConfig::new(space).with_random_state(7);
        let mut history = RunHistory::new();
        history.record("Coherence", 0, vec![0.1, 0.3]).unwrap();
        history.record("Coherence", 1, vec![0.4, 0.6]).unwrap();

        BestEvaluation {
            format_version: FORMAT_VERSION,
            run_id: Uuid::new_v4(),
            saved_at: Utc::now(),
            current_call: 2,
            hyperparameters: vec!["alpha".into(), "num_topics".into()],
            x_iters: BTreeMap::from([
                (
                    "alpha".to_string(),
                    vec![ParameterValue::Float(0.5), ParameterValue::Float(0.25)],
                ),
                (
                    "num_topics".to_string(),
                    vec![ParameterValue::Int(10), ParameterValue::Int(20)],
                ),
            ]),
            func_vals: vec![-0.2, -0.5],
            f_val: vec![0.2, 0.5],
            x_best: Some(Hyperparameters::from([
                ("alpha".to_string(), ParameterValue::Float(0.25)),
                ("num_topics".to_string(), ParameterValue::Int(20)),
            ])),
            f_best: Some(0.5),
            times: vec![1.5, 2.0],
            dict_model_runs: history,
            stop_reason: None,
            model_name: "LDA".into(),
            dataset_name: "toy".into(),
            dataset_path: Some("data/toy.json".into()),
            metric_name: "Coherence".into(),
            metric_attributes: json!({"topk": 10}),
            extra_metric_names: vec![],
            extra_metric_attributes: vec![],
            config,
        }
    }

    #[test]
    fn saved_checkpoint_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");
        let original = report();
        save(&original, &path).unwrap();

        let checkpoint = Checkpoint::load(&path).unwrap();
        assert_eq!(checkpoint.path(), Some(path.as_path()));
        assert_eq!(checkpoint.evaluation().unwrap(), original);
        assert_eq!(checkpoint.require::<usize>("number_of_call").unwrap(), 5);
        assert_eq!(checkpoint.require::<Option<u64>>("random_state").unwrap(), Some(7));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn document_uses_flat_field_names() {
        let checkpoint = Checkpoint::from_report(&report()).unwrap();
        let fields = checkpoint.fields();
        for key in [
            "x_iters",
            "func_vals",
            "f_val",
            "times",
            "dict_model_runs",
            "search_space",
            "optimization_type",
            "save_path",
            "metric_name",
        ] {
            assert!(fields.contains_key(key), "missing {key}");
        }
        assert_eq!(fields["dict_model_runs"]["Coherence"]["iteration_1"], json!([0.4, 0.6]));
        assert_eq!(fields["optimization_type"], json!("Maximize"));
    }

    #[test]
    fn overwrite_replaces_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("result.json");
        let mut doc = report();
        save(&doc, &path).unwrap();
        doc.current_call = 3;
        save(&doc, &path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.require::<usize>("current_call").unwrap(), 3);
    }

    #[test]
    fn missing_and_malformed_fields() {
        let mut value = serde_json::to_value(report()).unwrap();
        let fields = value.as_object_mut().unwrap();
        fields.remove("x_iters");
        fields.insert("times".into(), json!("soon"));
        let checkpoint = Checkpoint::from_value(value).unwrap();

        let missing = checkpoint
            .require::<BTreeMap<String, Vec<ParameterValue>>>("x_iters")
            .unwrap_err();
        assert!(matches!(
            missing,
            TuneError::Restart(RestartError::MissingField { ref field }) if field == "x_iters"
        ));

        let malformed = checkpoint.require::<Vec<f64>>("times").unwrap_err();
        assert!(matches!(
            malformed,
            TuneError::Restart(RestartError::MalformedField { .. })
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        let checkpoint = Checkpoint::from_report(&report()).unwrap();
        assert_eq!(checkpoint.resolve(Some(9usize), "model_runs").unwrap(), 9);
        assert_eq!(checkpoint.resolve(None::<usize>, "model_runs").unwrap(), 5);
        assert!(checkpoint.resolve(None::<usize>, "no_such_field").is_err());
    }

    #[test]
    fn non_object_documents_are_rejected() {
        assert!(Checkpoint::from_value(json!([1, 2, 3])).is_err());
    }
}
