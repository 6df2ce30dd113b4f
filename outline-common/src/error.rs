//! Error types for the outline tracing toolkit
//!
//! Every stage of the raster-to-polygon pipeline either produces a complete
//! result or fails with one of these errors. There is no partial output.

use std::io;
use thiserror::Error;

/// Errors produced by mask building, tracing, repair, mapping and writing.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: buffer size does not match the declared raster size,
    /// band out of range, unreadable raster header
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A numeric parameter outside its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// An internal topology invariant does not hold. This indicates a bug in
    /// the tracer or a repair stage and aborts the whole run.
    #[error("Topology invariant violated: {0}")]
    Topology(String),

    /// A ring set was handed to a stage expecting another coordinate space
    #[error("Coordinate space mismatch: expected {expected}, found {found}")]
    CoordSpace {
        expected: &'static str,
        found: &'static str,
    },

    /// Affine or projection failure
    #[error("Projection error: {0}")]
    Projection(String),

    /// Invalid or contradictory options
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Cannot parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn topology(msg: impl Into<String>) -> Self {
        Error::Topology(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for errors that indicate a bug rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Topology(_))
    }
}

/// Result type alias for outline operations
pub type Result<T> = std::result::Result<T, Error>;
