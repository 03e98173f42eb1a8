//! Error type definitions for the thumbnail server
//!
//! This module defines all error types used throughout the application.
//! `thiserror` provides the trait implementations and error chaining.

use std::time::Duration;
use thiserror::Error;

use crate::pipeline::OutputFormat;

/// Top-level application error type
///
/// Every request handler resolves to either a response body or one of
/// these variants. None of them are fatal to the process.
#[derive(Error, Debug)]
pub enum AppError {
    /// Client supplied an unusable path, dimension or extension
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The upload was not a well-formed multipart submission
    #[error("Malformed upload: {message}")]
    MalformedUpload { message: String },

    /// The client exceeded its request budget
    #[error("Rate limited: {client} blocked for another {}ms", .retry_after.as_millis())]
    RateLimited { client: String, retry_after: Duration },

    /// No original stored under the identifier
    #[error("Not found: image {id}")]
    NotFound { id: String },

    /// Rendering failed
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Reading or writing an original failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Image pipeline specific errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Requested size is outside the accepted range
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Stored bytes are not a decodable image
    #[error("Decode failed: {0}")]
    Decode(#[source] image::ImageError),

    /// An encoder rejected the resized image
    #[error("Encode failed for {format}: {source}")]
    Encode {
        format: OutputFormat,
        #[source]
        source: image::ImageError,
    },

    /// Every encoder in a format race failed
    #[error("No encoder produced output")]
    NoEncoderSucceeded,

    /// Resize and encode did not finish before the deadline
    #[error("Render timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A blocking render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Storage layer specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No free identifier found within the retry ceiling
    #[error("Identifier space exhausted after {attempts} attempts")]
    IdentifiersExhausted { attempts: usize },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create an invalid request error with a custom message
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a malformed upload error
    pub fn malformed_upload<S: Into<String>>(message: S) -> Self {
        Self::MalformedUpload {
            message: message.into(),
        }
    }

    /// Create a not found error for an identifier
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short marker appended to the home redirect (`/?marker`)
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            AppError::RateLimited { .. } => Some("limit"),
            AppError::Pipeline(PipelineError::Timeout(_)) => Some("timeout"),
            AppError::Pipeline(err) if err.is_client_error() => None,
            AppError::MalformedUpload { .. } | AppError::Pipeline(_) => Some("bad"),
            AppError::InvalidRequest { .. }
            | AppError::NotFound { .. }
            | AppError::Storage(_)
            | AppError::Internal { .. } => None,
        }
    }
}

impl PipelineError {
    /// Whether the failure was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidDimensions { .. })
    }
}
