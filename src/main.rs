use std::{path::PathBuf, process};

use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::RmsPropConfig,
};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vehicle_classifier::{
    data::LabelRule,
    error::Error,
    model::ModelConfig,
    predict::predict,
    report::TrainingHistory,
    training::{train, TrainingConfig},
};

/// Fine-tune a frozen ResNet50 backbone into a vehicle / not_vehicle
/// classifier, then score individual test images.
#[derive(Debug, Parser)]
struct Args {
    /// Corpus root with one subdirectory of images per class or session.
    data_dir: PathBuf,

    /// Where config, checkpoints, metric logs and history are written.
    #[arg(long, default_value = "artifact")]
    artifact_dir: PathBuf,

    /// Image to score after training; repeatable.
    #[arg(long = "test-image")]
    test_images: Vec<PathBuf>,

    /// Pretrained backbone record; without it the frozen backbone keeps its
    /// random initialization.
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    /// Derive labels from directory names instead of filename tokens.
    #[arg(long)]
    directory_labels: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args) {
        error!("{err}");
        process::exit(err.exit_code());
    }
}

fn run(args: &Args) -> Result<(), Error> {
    type Backend = Wgpu<f32, i32>;
    type AutodiffBackend = Autodiff<Backend>;

    let device = WgpuDevice::default();

    let model = ModelConfig::new().with_backbone_weights(
        args.backbone_weights
            .as_ref()
            .map(|path| path.display().to_string()),
    );
    // Keras-style RMSprop: rho 0.9, no momentum.
    let optimizer = RmsPropConfig::new().with_alpha(0.9).with_momentum(0.0);
    let label_rule = if args.directory_labels {
        LabelRule::DirectoryName
    } else {
        LabelRule::FilenameToken
    };
    let config = TrainingConfig::new(model, optimizer).with_label_rule(label_rule);
    let epoch_count = config.epoch_count;

    let (model, _summary) = train::<AutodiffBackend>(
        &args.artifact_dir,
        &args.data_dir,
        config,
        device.clone(),
    )?;

    let history = TrainingHistory::from_artifacts(&args.artifact_dir, epoch_count);
    history.save(&args.artifact_dir)?;
    println!("{}", history.render());

    for path in &args.test_images {
        predict(&model, path, &device)?;
    }

    Ok(())
}
