//! Service layer
//!
//! Services hold the request orchestration that sits between the thin web
//! handlers and the core components (limiter, cache, pipeline, storage).
//!
//! - [`ThumbnailService`]: uploads, originals and resized renders
//! - [`CacheMaintenance`]: background expiry and periodic cache reset

pub mod cache_maintenance;
pub mod thumbnails;

pub use cache_maintenance::CacheMaintenance;
pub use thumbnails::{ImageRequest, ServiceStats, ThumbnailService};
