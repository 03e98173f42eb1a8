//! Ingress control
//!
//! Two independent checks run before a request reaches the cache or the
//! image pipeline:
//!
//! - [`RateLimiter`]: per-client weighted budget with escalating blocks
//! - [`AdmissionGate`]: global cap on requests processed at the same time

pub mod gate;
pub mod rate;

pub use gate::{AdmissionGate, AdmissionPermit};
pub use rate::{Admission, ClientState, RateLimitPolicy, RateLimiter, RequestClass};
