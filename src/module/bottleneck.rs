use burn::{prelude::*, tensor::activation::relu};
use nn::PaddingConfig2d;

use super::conv2d_norm::{Conv2dNorm, Conv2dNormConfig};

pub const EXPANSION: usize = 4;

/// ResNet v1 bottleneck: 1x1 reduce, 3x3 (carrying the stride), 1x1 expand
/// by a factor of 4, with an identity or projected residual connection.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub reduce: Conv2dNorm<B>,
    pub conv: Conv2dNorm<B>,
    pub expand: Conv2dNorm<B>,

    pub downsample: Option<Conv2dNorm<B>>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let x = self.reduce.forward(x);
        let x = self.conv.forward(x);
        let x = self.expand.forward(x);

        relu(x + residual)
    }
}

#[derive(Config, Debug)]
pub struct BottleneckConfig {
    pub channels: [usize; 2],
    pub planes: usize,
    pub stride: [usize; 2],
}

impl BottleneckConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Bottleneck<B> {
        let is_identity = self.stride == [1, 1] && self.channels[0] == self.channels[1];
        let downsample = if is_identity {
            None
        } else {
            Some(
                Conv2dNormConfig::new(
                    self.channels,
                    [1, 1],
                    self.stride,
                    PaddingConfig2d::Valid,
                )
                .with_activation(false)
                .init(device),
            )
        };

        Bottleneck {
            reduce: Conv2dNormConfig::new(
                [self.channels[0], self.planes],
                [1, 1],
                [1, 1],
                PaddingConfig2d::Valid,
            )
            .init(device),

            conv: Conv2dNormConfig::new(
                [self.planes, self.planes],
                [3, 3],
                self.stride,
                PaddingConfig2d::Explicit(1, 1),
            )
            .init(device),

            expand: Conv2dNormConfig::new(
                [self.planes, self.channels[1]],
                [1, 1],
                [1, 1],
                PaddingConfig2d::Valid,
            )
            .with_activation(false)
            .init(device),

            downsample,
        }
    }
}
