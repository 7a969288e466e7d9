pub mod bottleneck;
pub mod conv2d_norm;
pub mod resnet;
