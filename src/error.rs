use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the classifier, each mapped to a distinct exit code
/// so a caller can tell bad input apart from a failed run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("corpus directory '{path}' is not readable: {source}")]
    CorpusDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corpus at '{path}' contains no images")]
    EmptyCorpus { path: PathBuf },

    #[error("directory '{path}' does not name a known class (expected 'vehicle' or 'not_vehicle')")]
    UnrecognizedClass { path: PathBuf },

    #[error("failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to load backbone weights from '{path}': {source}")]
    Weights {
        path: PathBuf,
        source: burn::record::RecorderError,
    },

    #[error("failed to write training artifact '{path}': {source}")]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to save trained model to '{path}': {source}")]
    SaveModel {
        path: PathBuf,
        source: burn::record::RecorderError,
    },

    #[error("failed to record training history: {0}")]
    History(#[from] serde_json::Error),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CorpusDir { .. } | Error::Image { .. } | Error::UnrecognizedClass { .. } => 2,
            Error::EmptyCorpus { .. } => 3,
            Error::Weights { .. }
            | Error::Artifact { .. }
            | Error::SaveModel { .. }
            | Error::History(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_failure_classes() {
        let bad_dir = Error::CorpusDir {
            path: "/nope".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let empty = Error::EmptyCorpus { path: "/data".into() };

        assert_eq!(bad_dir.exit_code(), 2);
        assert_eq!(empty.exit_code(), 3);
        assert_ne!(bad_dir.exit_code(), empty.exit_code());
    }
}
