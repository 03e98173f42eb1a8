//! Web handlers module
//!
//! Handlers stay thin: parse the path, call the thumbnail service and turn
//! the outcome into a response.

pub mod health;
pub mod images;
pub mod index;
pub mod upload;
