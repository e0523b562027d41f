//! Datasets, model outputs, and the model/metric capabilities the optimizer drives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::TuneResult;
use crate::space::Hyperparameters;

/// A tokenized corpus with its vocabulary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub corpus: Vec<Vec<String>>,
    pub vocabulary: Vec<String>,
    /// Where the dataset was loaded from, recorded in checkpoints so a restart
    /// can reload it.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Dataset {
    /// Build a dataset, deriving a sorted vocabulary from the corpus.
    pub fn new(name: impl Into<String>, corpus: Vec<Vec<String>>) -> Self {
        let vocabulary: BTreeSet<&String> = corpus.iter().flatten().collect();
        let vocabulary = vocabulary.into_iter().cloned().collect();
        Self {
            name: name.into(),
            corpus,
            vocabulary,
            path: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> TuneResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let mut dataset: Dataset = serde_json::from_str(&json)?;
        dataset.path = Some(path.to_path_buf());
        Ok(dataset)
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> TuneResult<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string(self)?)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn num_documents(&self) -> usize {
        self.corpus.len()
    }
}

/// What a model should compute besides training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Number of top words per topic; 0 skips topic extraction.
    pub top_k: usize,
    pub topic_word_matrix: bool,
    pub topic_document_matrix: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            topic_word_matrix: true,
            topic_document_matrix: true,
        }
    }
}

/// Artifact of one trained topic model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Top words of each topic.
    #[serde(default)]
    pub topics: Option<Vec<Vec<String>>>,
    /// topics x vocabulary
    #[serde(default)]
    pub topic_word_matrix: Option<Vec<Vec<f64>>>,
    /// topics x documents
    #[serde(default)]
    pub topic_document_matrix: Option<Vec<Vec<f64>>>,
}

impl ModelOutput {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TuneResult<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// A trainable topic model.
pub trait TopicModel: Send + Sync {
    /// Train from scratch with the given hyperparameters.
    fn train_model(
        &self,
        dataset: &Dataset,
        hyperparameters: &Hyperparameters,
        output: &OutputOptions,
    ) -> anyhow::Result<ModelOutput>;

    /// Model name, recorded in checkpoints.
    fn name(&self) -> &str;
}

/// Scores a trained model.
pub trait Metric: Send + Sync {
    /// Class-like identifier; keys the run history and the metric registry.
    fn name(&self) -> &str;

    /// Configuration needed to rebuild this metric from a checkpoint.
    fn attributes(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn score(&self, output: &ModelOutput) -> anyhow::Result<f64>;
}
