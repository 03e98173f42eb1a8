//! Centralized error handling for the thumbnail server
//!
//! Errors are grouped by the layer that produces them:
//!
//! - **Pipeline Errors**: decode, resize, encode and timeout failures
//! - **Storage Errors**: reading and writing uploaded originals
//! - **Application Errors**: request-level outcomes such as invalid input
//!   or rate-limit denials, which the web layer turns into redirects
//!
//! # Usage
//!
//! ```rust
//! use thumber::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::invalid_request("width out of range"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for pipeline Results
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Convenience type alias for storage Results
pub type StorageResult<T> = Result<T, StorageError>;
