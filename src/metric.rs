use core::marker::PhantomData;

use burn::{
    prelude::*,
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

/// Probabilities and integer targets for one batch.
#[derive(Debug)]
pub struct BinaryAccuracyInput<B: Backend> {
    outputs: Tensor<B, 1>,
    targets: Tensor<B, 1, Int>,
}

impl<B: Backend> BinaryAccuracyInput<B> {
    pub fn new(outputs: Tensor<B, 1>, targets: Tensor<B, 1, Int>) -> Self {
        Self { outputs, targets }
    }
}

/// Accuracy for a single sigmoid output unit, thresholded at 0.5. The stock
/// accuracy metric argmaxes over a class dimension and cannot score a scalar
/// probability head.
#[derive(Default)]
pub struct BinaryAccuracyMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

impl<B: Backend> BinaryAccuracyMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for BinaryAccuracyMetric<B> {
    const NAME: &'static str = "Accuracy";

    type Input = BinaryAccuracyInput<B>;

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size] = input.targets.dims();

        let predictions = input.outputs.clone().greater_equal_elem(0.5).int();
        let correct = predictions
            .equal(input.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<f64>();

        let accuracy = 100.0 * correct / batch_size as f64;

        self.state.update(
            accuracy,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for BinaryAccuracyMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, data::dataloader::Progress};

    use super::*;

    type B = NdArray;

    fn metadata() -> MetricMetadata {
        MetricMetadata {
            progress: Progress {
                items_processed: 1,
                items_total: 1,
            },
            epoch: 1,
            epoch_total: 1,
            iteration: 1,
            lr: None,
        }
    }

    #[test]
    fn thresholds_probabilities_at_one_half() {
        let device = Default::default();
        let mut metric = BinaryAccuracyMetric::<B>::new();

        let outputs = Tensor::<B, 1>::from_floats([0.9, 0.2, 0.7, 0.4], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1, 0, 0, 1], &device);

        metric.update(
            &BinaryAccuracyInput::new(outputs, targets),
            &metadata(),
        );

        // 0.9 -> 1 and 0.2 -> 0 are right; 0.7 -> 1 and 0.4 -> 0 are wrong.
        assert_eq!(metric.value(), 50.0);
    }

    #[test]
    fn perfect_batch_scores_one_hundred() {
        let device = Default::default();
        let mut metric = BinaryAccuracyMetric::<B>::new();

        let outputs = Tensor::<B, 1>::from_floats([0.99, 0.01], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1, 0], &device);

        metric.update(
            &BinaryAccuracyInput::new(outputs, targets),
            &metadata(),
        );

        assert_eq!(metric.value(), 100.0);
    }
}
