use burn::prelude::*;
use nn::{
    pool::{MaxPool2d, MaxPool2dConfig},
    PaddingConfig2d,
};

use super::{
    bottleneck::{Bottleneck, BottleneckConfig, EXPANSION},
    conv2d_norm::{Conv2dNorm, Conv2dNormConfig},
};

const BOTTLENECK_SETTINGS: [[usize; 3]; 4] = [
    // (p = bottleneck planes; n = num blocks; s = stride of the first block)
    // p, n, s
    [64, 3, 1],
    [128, 4, 2],
    [256, 6, 2],
    [512, 3, 2],
];

/// Channels of the final feature map.
pub const FEATURE_CHANNELS: usize = 512 * EXPANSION;

/// Spatial side of the final feature map for 224x224 input.
pub const FEATURE_SIDE: usize = 7;

/// ResNet50 convolutional feature extractor: 7x7/2 stem, 3x3/2 max pool,
/// then the four bottleneck stages. Maps `[n, 3, 224, 224]` to
/// `[n, 2048, 7, 7]`.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: Conv2dNorm<B>,
    pool: MaxPool2d,
    bottlenecks: Vec<Bottleneck<B>>,
}

impl<B: Backend> Backbone<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(x);
        let x = self.pool.forward(x);

        self.bottlenecks
            .iter()
            .fold(x, |x, bottleneck| bottleneck.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct BackboneConfig {}

impl BackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut input_channel = 64;
        let mut bottlenecks = vec![];

        for [planes, block_count, stride] in BOTTLENECK_SETTINGS {
            let output_channel = planes * EXPANSION;

            bottlenecks.push(
                BottleneckConfig::new([input_channel, output_channel], planes, [stride, stride])
                    .init(device),
            );
            for _ in 0..block_count - 1 {
                bottlenecks.push(
                    BottleneckConfig::new([output_channel, output_channel], planes, [1, 1])
                        .init(device),
                );
            }

            input_channel = output_channel;
        }

        Backbone {
            stem: Conv2dNormConfig::new(
                [3, 64],
                [7, 7],
                [2, 2],
                PaddingConfig2d::Explicit(3, 3),
            )
            .init(device),

            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),

            bottlenecks,
        }
    }
}
