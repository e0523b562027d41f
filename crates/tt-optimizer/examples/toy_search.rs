use std::collections::BTreeMap;

use anyhow::Context;
use tt_optimizer::{Checkpoint, Optimizer, OptimizerConfig, RestartOptions, TopicDiversity};
use tt_types::*;

/// Groups words into topics by hashing, so diversity depends on the
/// hyperparameters without any real training.
struct HashingModel;

impl TopicModel for HashingModel {
    fn train_model(
        &self,
        dataset: &Dataset,
        hyperparameters: &Hyperparameters,
        output: &OutputOptions,
    ) -> anyhow::Result<ModelOutput> {
        let num_topics = hyperparameters
            .get("num_topics")
            .and_then(ParameterValue::as_i64)
            .context("num_topics missing")? as usize;
        let alpha = hyperparameters
            .get("alpha")
            .and_then(ParameterValue::as_f64)
            .context("alpha missing")?;

        let mut topics: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (i, word) in dataset.vocabulary.iter().enumerate() {
            let bucket = (i as f64 * (1.0 + alpha)) as usize % num_topics;
            topics.entry(bucket).or_default().push(word.clone());
        }
        let topics = topics
            .into_values()
            .map(|mut words| {
                words.resize(output.top_k, dataset.vocabulary[0].clone());
                words
            })
            .collect();

        Ok(ModelOutput {
            topics: Some(topics),
            ..ModelOutput::default()
        })
    }

    fn name(&self) -> &str {
        "HashingModel"
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    println!("TopicTune toy search");

    let words = "topic model latent theme word document corpus vocabulary \
                 bayes prior sample gibbs dirichlet allocation inference";
    let corpus = (0..4)
        .map(|shift| {
            words
                .split_whitespace()
                .cycle()
                .skip(shift)
                .take(12)
                .map(str::to_string)
                .collect()
        })
        .collect();
    let out_dir = std::env::temp_dir().join("tt-toy-search");
    std::fs::create_dir_all(&out_dir)?;
    let mut dataset = Dataset::new("toy", corpus);
    dataset.save(out_dir.join("dataset.json"))?;

    let space = SearchSpace::new()
        .add_real("alpha", 0.0, 1.0)
        .add_int("num_topics", 2, 8);
    let config = OptimizerConfig::new(space)
        .with_number_of_call(8)
        .with_model_runs(3)
        .with_initial_points(InitialPointGenerator::Lhs, 4)
        .with_random_state(42)
        .with_save(out_dir.to_string_lossy(), "toy_result", 2);

    let mut optimizer = Optimizer::new(
        Box::new(HashingModel),
        dataset,
        Box::new(TopicDiversity::new(5)),
        config,
    )?;
    let report = optimizer.optimize()?;
    println!(
        "Best diversity after {} calls: {:?}",
        report.current_call, report.f_best
    );
    println!("Best hyperparameters: {:?}", report.x_best);

    let checkpoint = Checkpoint::load(optimizer.checkpoint_path())?;
    let mut resumed = Optimizer::restart(
        &checkpoint,
        4,
        Box::new(HashingModel),
        RestartOptions::default(),
    )?;
    let report = resumed.optimize()?;
    println!(
        "Best diversity after {} calls: {:?}",
        report.current_call, report.f_best
    );

    Ok(())
}
