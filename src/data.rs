use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{Dataset, InMemDataset},
    },
    prelude::*,
};
use image::{imageops::FilterType, ImageReader};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const WIDTH: usize = 224;
pub const HEIGHT: usize = 224;
pub const CHANNEL_COUNT: usize = 3;

pub const NEGATIVE_CLASS: &str = "not_vehicle";
pub const POSITIVE_CLASS: &str = "vehicle";

// ImageNet statistics, matching the pretrained backbone's input distribution.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone)]
pub struct VehicleImage {
    pub image: [[[u8; WIDTH]; HEIGHT]; CHANNEL_COUNT],
    pub label: u32,
}

/// How a file's binary label is derived while walking the corpus.
#[derive(Config, Debug, PartialEq)]
pub enum LabelRule {
    /// Filename containing `not_vehicle` maps to 0, everything else to 1.
    /// A recognized directory name that contradicts the filename is logged,
    /// not silently accepted.
    FilenameToken,
    /// The parent directory must be named `vehicle` or `not_vehicle`; any
    /// other directory name is an error.
    DirectoryName,
}

fn directory_class(dir_name: &str) -> Option<u32> {
    match dir_name {
        NEGATIVE_CLASS => Some(0),
        POSITIVE_CLASS => Some(1),
        _ => None,
    }
}

impl LabelRule {
    fn label(&self, dir: &Path, file_name: &str) -> Result<u32> {
        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        match self {
            LabelRule::FilenameToken => {
                let label = u32::from(!file_name.contains(NEGATIVE_CLASS));
                if let Some(expected) = directory_class(dir_name) {
                    if expected != label {
                        warn!(
                            file = file_name,
                            directory = dir_name,
                            "filename-derived label disagrees with directory class"
                        );
                    }
                }
                Ok(label)
            }
            LabelRule::DirectoryName => directory_class(dir_name).ok_or_else(|| {
                Error::UnrecognizedClass {
                    path: dir.to_path_buf(),
                }
            }),
        }
    }
}

/// Decode one image file into the fixed 224x224 CHW byte volume.
fn read_pixels(path: &Path) -> Result<[[[u8; WIDTH]; HEIGHT]; CHANNEL_COUNT]> {
    let to_error = |source| Error::Image {
        path: path.to_path_buf(),
        source,
    };

    let image_raw = ImageReader::open(path)
        .map_err(|source| to_error(image::ImageError::IoError(source)))?
        .decode()
        .map_err(to_error)?;

    let image_raw = image_raw.resize_exact(WIDTH as u32, HEIGHT as u32, FilterType::Triangle);
    let image_raw = image_raw.to_rgb8();

    let mut image = [[[0; WIDTH]; HEIGHT]; CHANNEL_COUNT];
    for (i, pixel) in image_raw.pixels().enumerate() {
        let h = i / WIDTH;
        let w = i % WIDTH;
        let [r, g, b] = pixel.0;
        image[0][h][w] = r;
        image[1][h][w] = g;
        image[2][h][w] = b;
    }

    Ok(image)
}

pub struct VehicleDataset {
    pub dataset: InMemDataset<VehicleImage>,
}

impl Dataset<VehicleImage> for VehicleDataset {
    fn get(&self, index: usize) -> Option<VehicleImage> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl VehicleDataset {
    /// Walk every subdirectory of `data_dir` and decode every file found,
    /// in lexicographic order. Any unreadable or undecodable file aborts the
    /// load; an empty corpus is its own error.
    pub fn load(data_dir: &Path, rule: &LabelRule) -> Result<Vec<VehicleImage>> {
        let read_dir = |path: &Path| -> Result<Vec<PathBuf>> {
            let mut entries = fs::read_dir(path)
                .map_err(|source| Error::CorpusDir {
                    path: path.to_path_buf(),
                    source,
                })?
                .map(|entry| {
                    entry
                        .map(|entry| entry.path())
                        .map_err(|source| Error::CorpusDir {
                            path: path.to_path_buf(),
                            source,
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            entries.sort();
            Ok(entries)
        };

        let mut labeled_paths = vec![];
        for dir in read_dir(data_dir)?.iter().filter(|path| path.is_dir()) {
            let files = read_dir(dir)?;
            info!(directory = %dir.display(), files = files.len(), "loading corpus directory");

            for path in files {
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                let label = rule.label(dir, file_name)?;
                labeled_paths.push((path, label));
            }
        }

        if labeled_paths.is_empty() {
            return Err(Error::EmptyCorpus {
                path: data_dir.to_path_buf(),
            });
        }

        labeled_paths
            .par_iter()
            .map(|(path, label)| {
                Ok(VehicleImage {
                    image: read_pixels(path)?,
                    label: *label,
                })
            })
            .collect()
    }

    /// Deterministic shuffle then 80/20 split.
    pub fn split(mut items: Vec<VehicleImage>, seed: u64) -> (Self, Self) {
        items.shuffle(&mut StdRng::seed_from_u64(seed));

        let (train_items, valid_items) = items.split_at(items.len() * 8 / 10);

        (
            VehicleDataset {
                dataset: InMemDataset::new(train_items.to_vec()),
            },
            VehicleDataset {
                dataset: InMemDataset::new(valid_items.to_vec()),
            },
        )
    }
}

/// Scale to [0, 1] then standardize with the backbone's channel statistics.
pub fn normalize<B: Backend>(images: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
    let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);

    (images / 255. - mean) / std
}

fn to_tensor<B: Backend>(
    image: &[[[u8; WIDTH]; HEIGHT]; CHANNEL_COUNT],
    device: &B::Device,
) -> Tensor<B, 4> {
    let data = TensorData::from(*image).convert::<B::FloatElem>();
    Tensor::<B, 3>::from_data(data, device).reshape([1, CHANNEL_COUNT, HEIGHT, WIDTH])
}

/// Decode a single image into a normalized `[1, 3, 224, 224]` batch, for
/// ad-hoc inference outside the dataloader.
pub fn load_image_tensor<B: Backend>(path: &Path, device: &B::Device) -> Result<Tensor<B, 4>> {
    let pixels = read_pixels(path)?;
    Ok(normalize(to_tensor::<B>(&pixels, device), device))
}

#[derive(Clone, Debug)]
pub struct VehicleBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone)]
pub struct VehicleBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> VehicleBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<VehicleImage, VehicleBatch<B>> for VehicleBatcher<B> {
    fn batch(&self, items: Vec<VehicleImage>) -> VehicleBatch<B> {
        let images = items
            .iter()
            .map(|item| to_tensor::<B>(&item.image, &self.device))
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    [(item.label as i64).elem::<B::IntElem>()],
                    &self.device,
                )
            })
            .collect();

        let images = normalize(Tensor::cat(images, 0), &self.device).to_device(&self.device);
        let targets = Tensor::cat(targets, 0).to_device(&self.device);

        VehicleBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use burn::backend::NdArray;
    use image::RgbImage;
    use tempfile::TempDir;

    use super::*;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]))
            .save(dir.join(name))
            .unwrap();
    }

    /// 10-image corpus: 6 vehicle, 4 not_vehicle, spread over two session
    /// directories with varying source dimensions.
    fn sample_corpus() -> TempDir {
        let root = TempDir::new().unwrap();

        let train = root.path().join("vehicles_train");
        let extra = root.path().join("vehicles_extra");
        fs::create_dir_all(&train).unwrap();
        fs::create_dir_all(&extra).unwrap();

        for i in 0..4 {
            write_image(&train, &format!("{i:04}_vehicle.png"), 64, 48);
        }
        for i in 0..3 {
            write_image(&train, &format!("{i:04}_not_vehicle.png"), 30, 90);
        }
        for i in 0..2 {
            write_image(&extra, &format!("{i:04}_vehicle.png"), 224, 224);
        }
        write_image(&extra, "0002_not_vehicle.png", 300, 200);

        root
    }

    #[test]
    fn filename_token_labels_negative_and_positive() {
        let rule = LabelRule::FilenameToken;
        let dir = Path::new("/data/vehicles_train");

        assert_eq!(rule.label(dir, "4593_not_vehicle.jpg").unwrap(), 0);
        assert_eq!(rule.label(dir, "02033_vehicle.jpg").unwrap(), 1);
        assert_eq!(rule.label(dir, "random_photo.jpg").unwrap(), 1);
    }

    #[test]
    fn directory_rule_rejects_unknown_class_names() {
        let rule = LabelRule::DirectoryName;

        assert_eq!(rule.label(Path::new("/data/vehicle"), "a.jpg").unwrap(), 1);
        assert_eq!(
            rule.label(Path::new("/data/not_vehicle"), "a.jpg").unwrap(),
            0
        );
        assert!(matches!(
            rule.label(Path::new("/data/misc"), "a.jpg"),
            Err(Error::UnrecognizedClass { .. })
        ));
    }

    #[test]
    fn load_counts_labels_and_splits() {
        let root = sample_corpus();

        let items = VehicleDataset::load(root.path(), &LabelRule::FilenameToken).unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items.iter().map(|item| item.label).sum::<u32>(), 6);

        let (train, valid) = VehicleDataset::split(items, 2);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn split_is_reproducible_for_a_fixed_seed() {
        let root = sample_corpus();

        let labels = |dataset: &VehicleDataset| -> Vec<u32> {
            (0..dataset.len())
                .map(|i| dataset.get(i).unwrap().label)
                .collect()
        };

        let items = VehicleDataset::load(root.path(), &LabelRule::FilenameToken).unwrap();
        let (train_a, valid_a) = VehicleDataset::split(items.clone(), 2);
        let (train_b, valid_b) = VehicleDataset::split(items, 2);

        assert_eq!(labels(&train_a), labels(&train_b));
        assert_eq!(labels(&valid_a), labels(&valid_b));
    }

    #[test]
    fn missing_corpus_directory_is_a_corpus_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("does_not_exist");

        assert!(matches!(
            VehicleDataset::load(&missing, &LabelRule::FilenameToken),
            Err(Error::CorpusDir { .. })
        ));
    }

    #[test]
    fn empty_corpus_is_its_own_error() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("vehicles_train")).unwrap();

        assert!(matches!(
            VehicleDataset::load(root.path(), &LabelRule::FilenameToken),
            Err(Error::EmptyCorpus { .. })
        ));
    }

    #[test]
    fn undecodable_file_aborts_the_load() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("vehicles_train");
        fs::create_dir_all(&dir).unwrap();

        let mut file = File::create(dir.join("0001_vehicle.jpg")).unwrap();
        file.write_all(b"this is not an image").unwrap();

        assert!(matches!(
            VehicleDataset::load(root.path(), &LabelRule::FilenameToken),
            Err(Error::Image { .. })
        ));
    }

    #[test]
    fn batcher_produces_normalized_batches() {
        type B = NdArray;

        let root = TempDir::new().unwrap();
        let dir = root.path().join("vehicles_train");
        fs::create_dir_all(&dir).unwrap();
        write_image(&dir, "0001_vehicle.png", 50, 70);
        write_image(&dir, "0002_not_vehicle.png", 400, 100);

        let items = VehicleDataset::load(root.path(), &LabelRule::FilenameToken).unwrap();
        let batch = VehicleBatcher::<B>::new(Default::default()).batch(items);

        assert_eq!(batch.images.dims(), [2, 3, 224, 224]);
        assert_eq!(batch.targets.dims(), [2]);

        // Constant 120/80/40 pixels standardize well inside (-3, 3).
        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() < 3.0));
    }
}
