//! Error handling for the time-scale modification library
//!
//! This module defines the error types that can occur while configuring or
//! driving the stretcher, with enough structure for callers to recover.

use thiserror::Error;

/// Result type alias for stretcher operations
pub type Result<T> = std::result::Result<T, StretchError>;

/// Error type for stretcher operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StretchError {
    /// Invalid stretcher configuration
    #[error("Invalid stretcher configuration: {details}")]
    InvalidConfig { details: String },

    /// Invalid channel count
    #[error("Invalid channel count: {channels} (supported: 1-{supported_max})")]
    InvalidChannelCount { channels: usize, supported_max: usize },

    /// Invalid sample rate
    #[error("Invalid sample rate: {rate}Hz (must be positive)")]
    InvalidSampleRate { rate: u32 },

    /// Wrong number of audio planes for this stream
    #[error("Invalid plane count: expected {expected}, got {actual}")]
    InvalidPlaneCount { expected: usize, actual: usize },

    /// Audio planes of a single call disagree on frame count
    #[error("Plane length mismatch: expected {expected} frames, got {actual}")]
    PlaneLengthMismatch { expected: usize, actual: usize },
}

impl StretchError {
    /// Create an invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        StretchError::InvalidConfig { details: details.into() }
    }
}
