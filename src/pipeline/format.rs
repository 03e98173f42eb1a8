//! Output formats the pipeline can encode

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raster encodings served to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Gif,
}

impl OutputFormat {
    /// Every encoder entered into a format race
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Gif];

    /// Map a path extension (without the dot) to a format.
    ///
    /// Matching is case-sensitive; only lowercase extensions are routed.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Gif => ImageFormat::Gif,
        }
    }

    /// Identify a format from the leading magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(OutputFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(OutputFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(OutputFormat::Gif)
        } else {
            None
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Gif => "gif",
        };
        f.write_str(name)
    }
}

/// Content type for stored bytes of unknown origin
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if let Some(format) = OutputFormat::sniff(bytes) {
        return format.mime_type();
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}
