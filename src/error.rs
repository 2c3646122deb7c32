//! Error types and result utilities for audio loading, analysis and output.
//!
//! Errors are hierarchical: [`AmenError`] is the top level type returned by every
//! fallible operation, and the more detailed [`ParameterError`] and
//! [`ProcessingError`] carry the context for the two most common failure families.

use std::convert::Infallible;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience type alias for results that may contain an [`AmenError`].
pub type AmenResult<T> = Result<T, AmenError>;

/// Error types that can occur while loading, analysing or writing audio.
#[derive(Error, Debug)]
pub enum AmenError {
    /// Bad or contradictory arguments.
    ///
    /// Covers non-positive sample rates, empty sample arrays, invalid analysis
    /// configuration and conflicting constructor inputs.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ParameterError),

    /// The container, codec or requested output format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The requested file does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A feature lookup used a key the collection does not contain.
    #[error("Unknown feature: '{0}'")]
    UnknownFeature(String),

    /// An internal algorithm (resampler, decoder, transform) failed.
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Any other I/O failure while reading or writing audio.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AmenError {
    /// Shorthand for an [`AmenError::InvalidInput`] with an invalid value.
    pub fn invalid_input(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        AmenError::InvalidInput(ParameterError::invalid_value(parameter, reason))
    }

    /// Shorthand for an [`AmenError::UnknownFeature`].
    pub fn unknown_feature(key: impl Into<String>) -> Self {
        AmenError::UnknownFeature(key.into())
    }
}

/// Errors describing a rejected parameter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    /// A single parameter holds a value outside its valid domain.
    #[error("invalid value for '{parameter}': {reason}")]
    InvalidValue {
        /// Name of the offending parameter.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two or more parameters cannot be combined.
    #[error("conflicting parameters: {0}")]
    Conflict(String),
}

impl ParameterError {
    /// Creates an [`ParameterError::InvalidValue`].
    pub fn invalid_value(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ParameterError::InvalidValue {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`ParameterError::Conflict`].
    pub fn conflict(reason: impl Into<String>) -> Self {
        ParameterError::Conflict(reason.into())
    }
}

/// Errors raised by an algorithm after its inputs were validated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The named operation failed.
    #[error("{operation} failed: {reason}")]
    AlgorithmFailure {
        /// The operation that failed (e.g. `"sinc_resampler"`).
        operation: String,
        /// Failure details from the underlying implementation.
        reason: String,
    },
}

impl ProcessingError {
    /// Creates a [`ProcessingError::AlgorithmFailure`].
    pub fn algorithm_failure(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        ProcessingError::AlgorithmFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<Infallible> for AmenError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl From<hound::Error> for AmenError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => AmenError::Io(io),
            hound::Error::FormatError(reason) => AmenError::UnsupportedFormat(reason.to_string()),
            hound::Error::Unsupported => {
                AmenError::UnsupportedFormat("unsupported WAV sample format".to_string())
            }
            other => AmenError::UnsupportedFormat(other.to_string()),
        }
    }
}
