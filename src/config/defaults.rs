/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB

// Storage defaults
pub const DEFAULT_UPLOADS_PATH: &str = "./uploads";
pub const DEFAULT_UPLOADS_PERMISSIONS: u32 = 0o700;
pub const DEFAULT_ID_LENGTH: usize = 6;

// Render cache defaults
pub const DEFAULT_CACHE_TTL: &str = "10m";
pub const DEFAULT_CACHE_RESET_INTERVAL: &str = "3m";

// Ingress control defaults
pub const DEFAULT_MAX_CONCURRENT: usize = 16;
pub const DEFAULT_RATE_LIMITING: bool = true;
pub const DEFAULT_RATE_WINDOW: &str = "10s";
pub const DEFAULT_RATE_THRESHOLD: u32 = 15;
pub const DEFAULT_RATE_PENALTY: &str = "1s";
pub const DEFAULT_READ_WEIGHT: u32 = 1;
pub const DEFAULT_WRITE_WEIGHT: u32 = 5;

// Render pipeline defaults
pub const DEFAULT_RENDER_TIMEOUT: &str = "5s";
pub const DEFAULT_MAX_DIMENSION: u32 = 10_000;
pub const DEFAULT_MIN_DIMENSION: u32 = 3;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 120;
