use std::path::Path;

use burn::{
    module::Module,
    prelude::*,
    record::CompactRecorder,
    tensor::{
        activation::{relu, sigmoid},
        backend::AutodiffBackend,
    },
    train::{
        metric::{Adaptor, LossInput},
        TrainOutput, TrainStep, ValidStep,
    },
};
use nn::{
    loss::BinaryCrossEntropyLossConfig, Linear, LinearConfig,
};

use crate::{
    data::VehicleBatch,
    error::{Error, Result},
    metric::BinaryAccuracyInput,
    module::resnet::{Backbone, BackboneConfig, FEATURE_CHANNELS, FEATURE_SIDE},
};

/// Frozen ResNet50 features, flattened into a small trainable binary head:
/// Linear(100352, hidden) + ReLU, then Linear(hidden, 1) read through a
/// sigmoid.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    backbone: Backbone<B>,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> Model<B> {
    /// Raw logits, one per input image.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        let x = self.backbone.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(self.hidden.forward(x));
        let x = self.output.forward(x);

        x.squeeze(1)
    }

    /// Probability of the positive (vehicle) class, in [0, 1].
    pub fn forward_probability(&self, x: Tensor<B, 4>) -> Tensor<B, 1> {
        sigmoid(self.forward(x))
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> BinaryClassificationOutput<B> {
        let logits = self.forward(images);

        let loss = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());

        BinaryClassificationOutput {
            loss,
            output: sigmoid(logits),
            targets,
        }
    }
}

/// Loss, sigmoid probabilities and targets for one batch.
#[derive(Clone, Debug)]
pub struct BinaryClassificationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub output: Tensor<B, 1>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Adaptor<LossInput<B>> for BinaryClassificationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<BinaryAccuracyInput<B>> for BinaryClassificationOutput<B> {
    fn adapt(&self) -> BinaryAccuracyInput<B> {
        BinaryAccuracyInput::new(self.output.clone(), self.targets.clone())
    }
}

impl<B: AutodiffBackend> TrainStep<VehicleBatch<B>, BinaryClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: VehicleBatch<B>) -> TrainOutput<BinaryClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<VehicleBatch<B>, BinaryClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: VehicleBatch<B>) -> BinaryClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 256)]
    pub hidden_size: usize,

    /// Leave the backbone out of the optimizer step. The two dense layers
    /// are then the only trainable parameters.
    #[config(default = true)]
    pub freeze_backbone: bool,

    /// Record file with pretrained backbone weights, loaded before freezing.
    pub backbone_weights: Option<String>,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Model<B>> {
        let mut backbone = BackboneConfig::new().init(device);

        if let Some(path) = &self.backbone_weights {
            backbone = backbone
                .load_file(path, &CompactRecorder::new(), device)
                .map_err(|source| Error::Weights {
                    path: Path::new(path).to_path_buf(),
                    source,
                })?;
        }
        if self.freeze_backbone {
            backbone = backbone.no_grad();
        }

        let feature_size = FEATURE_CHANNELS * FEATURE_SIDE * FEATURE_SIDE;

        Ok(Model {
            backbone,
            hidden: LinearConfig::new(feature_size, self.hidden_size).init(device),
            output: LinearConfig::new(self.hidden_size, 1).init(device),
        })
    }
}
