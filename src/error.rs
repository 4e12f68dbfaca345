//! Error types for Driftmap.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DriftError>;

#[derive(Debug, Error)]
pub enum DriftError {
    /// A reading lies outside the configured area during index construction.
    #[error("reading {label} at ({longitude}, {latitude}) lies outside the indexed area")]
    OutOfBounds {
        label: i64,
        longitude: f64,
        latitude: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid snapshot format")]
    InvalidFormat,

    #[error("serialization error: {0}")]
    SerializationErrorWithContext(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<driftmap_types::sensor::UnknownSensor> for DriftError {
    fn from(err: driftmap_types::sensor::UnknownSensor) -> Self {
        DriftError::InvalidInput(err.to_string())
    }
}
