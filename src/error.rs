// src/error.rs - Error taxonomy shared by the catalog, loaders and controls
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Level;

/// Which step of turning a selection into files failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStep {
    Camera,
    SegmentDirectory,
    VideoFile,
    SignalPatientDirectory,
    SessionPrefix,
    SignalFile,
}

impl fmt::Display for ResolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResolveStep::Camera => "camera folder",
            ResolveStep::SegmentDirectory => "segment folder",
            ResolveStep::VideoFile => "video file",
            ResolveStep::SignalPatientDirectory => "IMU patient folder",
            ResolveStep::SessionPrefix => "IMU session folder",
            ResolveStep::SignalFile => "IMU file",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Please select a {missing} before loading")]
    SelectionIncomplete { missing: Level },

    #[error("{step} not found: {}", path.display())]
    PathNotFound { step: ResolveStep, path: PathBuf },

    #[error("No {step} matching '{pattern}' in {}", dir.display())]
    NoMatchingFile {
        step: ResolveStep,
        dir: PathBuf,
        pattern: String,
    },

    #[error("{what} {value} is outside [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("IMU file has no samples to plot: {}", path.display())]
    EmptySignal { path: PathBuf },

    #[error("Invalid frame rate {0}")]
    InvalidFrameRate(f64),

    #[error("Failed to read IMU file: {0}")]
    Signal(#[from] csv::Error),

    #[error("Video error: {0}")]
    Video(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    pub fn out_of_range(what: &'static str, value: i64, min: i64, max: i64) -> Self {
        ViewerError::OutOfRange {
            what,
            value,
            min,
            max,
        }
    }

    /// Flattens an `anyhow` chain from the decoder plumbing into a message.
    pub fn video(err: anyhow::Error) -> Self {
        ViewerError::Video(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
