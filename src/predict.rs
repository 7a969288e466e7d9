use std::path::Path;

use burn::prelude::*;
use tracing::info;

use crate::{data, error::Result, model::Model};

/// Score one image through the same decode/resize/normalize pipeline the
/// corpus loader uses and return the raw sigmoid probability of the
/// positive (vehicle) class. No thresholding is applied.
pub fn predict<B: Backend>(
    model: &Model<B>,
    image_path: &Path,
    device: &B::Device,
) -> Result<f64> {
    let image = data::load_image_tensor::<B>(image_path, device)?;

    let score = model
        .forward_probability(image)
        .into_scalar()
        .elem::<f64>();

    info!(
        image = %image_path.display(),
        score = format!("{score:.6}"),
        "single-image prediction"
    );

    Ok(score)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use image::RgbImage;
    use tempfile::TempDir;

    use super::*;
    use crate::{error::Error, model::ModelConfig};

    type B = NdArray;

    #[test]
    fn prediction_is_a_probability() {
        let device = Default::default();
        let model = ModelConfig::new().init::<B>(&device).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("02033_vehicle.png");
        RgbImage::from_pixel(90, 120, image::Rgb([200, 30, 60]))
            .save(&path)
            .unwrap();

        let score = predict(&model, &path, &device).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn missing_test_image_is_an_error() {
        let device = Default::default();
        let model = ModelConfig::new().init::<B>(&device).unwrap();

        let result = predict(&model, Path::new("/missing/4593_not_vehicle.jpg"), &device);
        assert!(matches!(result, Err(Error::Image { .. })));
    }
}
