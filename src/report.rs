use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

const CHART_WIDTH: usize = 60;
const CHART_HEIGHT: usize = 10;

/// Per-epoch loss/accuracy series recovered from the learner's metric logs
/// (`<artifact>/{train,valid}/epoch-<n>/<Metric>.log`, one value per
/// iteration; an epoch's point is the mean of its iterations).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<usize>,
    pub train_loss: Vec<f64>,
    pub valid_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub valid_accuracy: Vec<f64>,
}

fn epoch_mean(path: &Path) -> Option<f64> {
    let content = fs::read_to_string(path)
        .map_err(|source| warn!(path = %path.display(), %source, "missing metric log"))
        .ok()?;

    let values: Vec<f64> = content
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();

    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

impl TrainingHistory {
    pub fn from_artifacts(artifact_dir: &Path, epoch_count: usize) -> Self {
        let mut history = Self::default();

        for epoch in 1..=epoch_count {
            let metric =
                |split: &str, name: &str| -> Option<f64> {
                    epoch_mean(
                        &artifact_dir
                            .join(split)
                            .join(format!("epoch-{epoch}"))
                            .join(format!("{name}.log")),
                    )
                };

            let (Some(train_loss), Some(valid_loss), Some(train_acc), Some(valid_acc)) = (
                metric("train", "Loss"),
                metric("valid", "Loss"),
                metric("train", "Accuracy"),
                metric("valid", "Accuracy"),
            ) else {
                break;
            };

            history.epochs.push(epoch);
            history.train_loss.push(train_loss);
            history.valid_loss.push(valid_loss);
            history.train_accuracy.push(train_acc);
            history.valid_accuracy.push(valid_acc);
        }

        history
    }

    pub fn save(&self, artifact_dir: &Path) -> Result<()> {
        let path = artifact_dir.join("history.json");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|source| Error::Artifact { path, source })
    }

    /// Loss and accuracy curves, train vs validation, as console charts.
    pub fn render(&self) -> String {
        if self.epochs.is_empty() {
            return "no training history recorded".into();
        }

        [
            render_chart(
                "loss per epoch",
                &[("training loss", 'o', &self.train_loss), ("validation loss", 'x', &self.valid_loss)],
            ),
            render_chart(
                "accuracy per epoch",
                &[
                    ("training accuracy", 'o', &self.train_accuracy),
                    ("validation accuracy", 'x', &self.valid_accuracy),
                ],
            ),
        ]
        .join("\n")
    }
}

fn render_chart(title: &str, series: &[(&str, char, &[f64])]) -> String {
    let all: Vec<f64> = series.iter().flat_map(|(_, _, v)| v.iter().copied()).collect();
    let min = all.iter().copied().fold(f64::INFINITY, f64::min);
    let max = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };

    let mut grid = vec![vec![' '; CHART_WIDTH]; CHART_HEIGHT];
    for (_, marker, values) in series {
        for (i, value) in values.iter().enumerate() {
            let column = if values.len() > 1 {
                i * (CHART_WIDTH - 1) / (values.len() - 1)
            } else {
                CHART_WIDTH / 2
            };
            let row = ((max - value) / span * (CHART_HEIGHT - 1) as f64).round() as usize;
            grid[row.min(CHART_HEIGHT - 1)][column] = *marker;
        }
    }

    let mut output = format!("{title}  [{min:.4} .. {max:.4}]\n");
    for row in grid {
        output.push('|');
        output.extend(row);
        output.push('\n');
    }
    output.push('+');
    output.extend(std::iter::repeat('-').take(CHART_WIDTH));
    output.push('\n');
    for (name, marker, _) in series {
        output.push_str(&format!("  {marker} = {name}\n"));
    }

    output
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_log(artifact: &Path, split: &str, epoch: usize, name: &str, values: &[f64]) {
        let dir = artifact.join(split).join(format!("epoch-{epoch}"));
        fs::create_dir_all(&dir).unwrap();

        let content: String = values.iter().map(|v| format!("{v}\n")).collect();
        fs::write(dir.join(format!("{name}.log")), content).unwrap();
    }

    #[test]
    fn recovers_epoch_means_from_metric_logs() {
        let artifact = TempDir::new().unwrap();

        for (epoch, loss) in [(1, 0.6), (2, 0.4)] {
            write_log(artifact.path(), "train", epoch, "Loss", &[loss + 0.1, loss - 0.1]);
            write_log(artifact.path(), "valid", epoch, "Loss", &[loss]);
            write_log(artifact.path(), "train", epoch, "Accuracy", &[70.0, 80.0]);
            write_log(artifact.path(), "valid", epoch, "Accuracy", &[75.0]);
        }

        let history = TrainingHistory::from_artifacts(artifact.path(), 2);

        assert_eq!(history.epochs, vec![1, 2]);
        assert!((history.train_loss[0] - 0.6).abs() < 1e-9);
        assert!((history.valid_loss[1] - 0.4).abs() < 1e-9);
        assert_eq!(history.train_accuracy, vec![75.0, 75.0]);
    }

    #[test]
    fn missing_logs_produce_an_empty_history() {
        let artifact = TempDir::new().unwrap();

        let history = TrainingHistory::from_artifacts(artifact.path(), 2);

        assert!(history.epochs.is_empty());
        assert_eq!(history.render(), "no training history recorded");
    }

    #[test]
    fn rendered_charts_carry_titles_and_legends() {
        let history = TrainingHistory {
            epochs: vec![1, 2],
            train_loss: vec![0.7, 0.5],
            valid_loss: vec![0.8, 0.6],
            train_accuracy: vec![60.0, 85.0],
            valid_accuracy: vec![55.0, 80.0],
        };

        let rendered = history.render();

        assert!(rendered.contains("loss per epoch"));
        assert!(rendered.contains("accuracy per epoch"));
        assert!(rendered.contains("o = training loss"));
        assert!(rendered.contains("x = validation accuracy"));
    }

    #[test]
    fn history_round_trips_through_json() {
        let artifact = TempDir::new().unwrap();
        let history = TrainingHistory {
            epochs: vec![1],
            train_loss: vec![0.5],
            valid_loss: vec![0.55],
            train_accuracy: vec![90.0],
            valid_accuracy: vec![88.0],
        };

        history.save(artifact.path()).unwrap();

        let json = fs::read_to_string(artifact.path().join("history.json")).unwrap();
        let loaded: TrainingHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.epochs, vec![1]);
        assert_eq!(loaded.valid_accuracy, vec![88.0]);
    }
}
