//! Error types for the site-probing pipeline.
//!
//! Each variant maps to how the run reacts to it: skip the tile,
//! abort the run, or skip the advisory for a single candidate.

use crate::models::TileId;
use thiserror::Error;

/// Errors produced by the pipeline stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The platform has no usable data for this tile (cloud cover, missing
    /// coverage). The tile is skipped and the run continues.
    #[error("no data for tile {tile}: {reason}")]
    DataUnavailable { tile: TileId, reason: String },

    /// Network, authentication or protocol failure talking to the
    /// geospatial platform. Aborts the run.
    #[error("platform error: {0}")]
    Platform(String),

    /// The language-model API failed for one candidate.
    #[error("advisory error: {0}")]
    Advisory(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl PipelineError {
    /// Whether the run can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::DataUnavailable { .. } | PipelineError::Advisory(_)
        )
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Export(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Export(err.to_string())
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
