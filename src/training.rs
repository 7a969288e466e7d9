use std::{fs, path::Path, time::Instant};

use burn::{
    config::Config,
    data::{
        dataloader::DataLoaderBuilder,
        dataset::{Dataset, InMemDataset},
    },
    module::{AutodiffModule, Module},
    optim::RmsPropConfig,
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, ElementConversion},
    train::{metric::LossMetric, LearnerBuilder},
};
use tracing::info;

use crate::{
    data::{LabelRule, VehicleBatcher, VehicleDataset},
    error::{Error, Result},
    metric::BinaryAccuracyMetric,
    model::{Model, ModelConfig},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,

    pub optimizer: RmsPropConfig,

    #[config(default = 2)]
    pub epoch_count: usize,

    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 10)]
    pub eval_batch_size: usize,

    #[config(default = 2)]
    pub seed: u64,

    #[config(default = 2.0e-5)]
    pub learning_rate: f64,

    #[config(default = 4)]
    worker_count: usize,

    #[config(default = "LabelRule::FilenameToken")]
    pub label_rule: LabelRule,
}

/// Held-out loss and accuracy from a single batched pass.
#[derive(Debug, Clone, Copy)]
pub struct EvalSummary {
    pub loss: f64,
    pub accuracy: f64,
}

fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    fs::remove_dir_all(artifact_dir).ok();
    fs::create_dir_all(artifact_dir).map_err(|source| Error::Artifact {
        path: artifact_dir.to_path_buf(),
        source,
    })
}

/// Load the corpus, fit the classifier head, then evaluate the held-out
/// split. Returns the trained inference model and the evaluation scalars.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    data_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> Result<(Model<B::InnerBackend>, EvalSummary)> {
    create_artifact_dir(artifact_dir)?;

    config
        .save(artifact_dir.join("config.json"))
        .map_err(|source| Error::Artifact {
            path: artifact_dir.join("config.json"),
            source,
        })?;

    B::seed(config.seed);

    let items = VehicleDataset::load(data_dir, &config.label_rule)?;
    info!(images = items.len(), "corpus loaded");

    let (train, valid) = VehicleDataset::split(items, config.seed);
    info!(
        train = train.len(),
        valid = valid.len(),
        "corpus shuffled and split 80/20"
    );

    // The learner consumes its dataloaders; keep the held-out items for the
    // final evaluation pass.
    let valid_items: Vec<_> = (0..valid.len()).filter_map(|i| valid.get(i)).collect();

    let batcher_train = VehicleBatcher::<B>::new(device.clone());
    let batcher_valid = VehicleBatcher::<B::InnerBackend>::new(device.clone());

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.worker_count)
        .build(train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.worker_count)
        .build(valid);

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(BinaryAccuracyMetric::new())
        .metric_valid_numeric(BinaryAccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device.clone()])
        .num_epochs(config.epoch_count)
        .summary()
        .build(
            config.model.init::<B>(&device)?,
            config.optimizer.init(),
            config.learning_rate,
        );

    let started = Instant::now();
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    info!(elapsed = ?started.elapsed(), "training finished");

    model_trained
        .clone()
        .save_file(artifact_dir.join("model"), &CompactRecorder::new())
        .map_err(|source| Error::SaveModel {
            path: artifact_dir.join("model"),
            source,
        })?;

    let model = model_trained.valid();
    let valid = VehicleDataset {
        dataset: InMemDataset::new(valid_items),
    };
    let summary = evaluate(&model, valid, batcher_valid, config.eval_batch_size);

    Ok((model, summary))
}

/// One pass over the held-out split at the (smaller) evaluation batch size,
/// aggregating mean loss and overall accuracy.
pub fn evaluate<B: burn::tensor::backend::Backend>(
    model: &Model<B>,
    valid: VehicleDataset,
    batcher: VehicleBatcher<B>,
    batch_size: usize,
) -> EvalSummary {
    let dataloader = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .build(valid);

    let mut loss_sum = 0.0;
    let mut correct = 0.0;
    let mut total = 0usize;
    let mut batches = 0usize;

    for batch in dataloader.iter() {
        let output = model.forward_classification(batch.images, batch.targets);

        loss_sum += output.loss.into_scalar().elem::<f64>();
        batches += 1;

        let [count] = output.targets.dims();
        total += count;
        correct += output
            .output
            .greater_equal_elem(0.5)
            .int()
            .equal(output.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<f64>();
    }

    let summary = EvalSummary {
        loss: loss_sum / batches.max(1) as f64,
        accuracy: correct / total.max(1) as f64,
    };
    info!(
        loss = format!("{:.4}", summary.loss),
        accuracy = format!("{:.4}%", summary.accuracy * 100.0),
        "held-out evaluation"
    );

    summary
}
