//! Error types shared by every stage of the bench.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while generating, loading, processing or reporting a dataset.
///
/// Nothing here is retried; every variant propagates straight out of
/// [`crate::bench::TestBench::run`].
#[derive(Error, Debug)]
pub enum BenchError {
    /// Filesystem failure with the path that triggered it.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line in a descriptor file.
    #[error("Descriptor {} line {line}: {message}", .path.display())]
    Descriptor {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A bright block has no dark block recorded at the same exposure.
    #[error("No dark images recorded for exposure {exposure}")]
    MissingDark { exposure: f64 },

    /// Frame dimensions disagree with the descriptor geometry.
    #[error(
        "Frame {} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}",
        .path.display()
    )]
    FrameSize {
        path: PathBuf,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Temporal statistics need a pair of frames.
    #[error("Block at exposure {exposure} has {frames} frame(s), at least 2 are required")]
    InsufficientFrames { exposure: f64, frames: usize },

    #[error("Failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The external dataset generator failed or returned garbage.
    #[error("Dataset generator failed: {0}")]
    Generator(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Plot rendering failed: {0}")]
    Plot(String),

    /// Processing without generation needs a configured output directory.
    #[error("No output directory configured")]
    MissingOutputDir,

    #[error("Descriptor {} references no bright images", .0.display())]
    EmptyDataset(PathBuf),

    #[error("No operating points to process")]
    NoMeasurements,
}

impl BenchError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for bench operations.
pub type BenchResult<T> = Result<T, BenchError>;
