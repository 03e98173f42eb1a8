//! Render job and result types

use bytes::Bytes;
use std::fmt;

use super::format::OutputFormat;

/// One requested variant of a stored original
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub id: String,
    /// Target width. Zero scales from the height preserving aspect ratio.
    pub width: u32,
    /// Target height. Zero scales from the width preserving aspect ratio.
    pub height: u32,
    /// Pinned output format. `None` races every encoder.
    pub format: Option<OutputFormat>,
}

impl RenderJob {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            format: None,
        }
    }

    pub fn with_format(mut self, format: Option<OutputFormat>) -> Self {
        self.format = format;
        self
    }
}

impl fmt::Display for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}x{}", self.id, self.width, self.height)?;
        if let Some(format) = self.format {
            write!(f, ".{}", format.extension())?;
        }
        Ok(())
    }
}

/// Encoded output of a render
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Final pixel size for a request against a source of `src_width` x `src_height`.
///
/// A zero side is derived from the other one, keeping the source aspect
/// ratio and never dropping below one pixel.
pub fn target_dimensions(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = |numerator: u32, other_src: u32, src: u32| -> u32 {
        if src == 0 {
            return 1;
        }
        let scaled = (u64::from(numerator) * u64::from(other_src) + u64::from(src) / 2) / u64::from(src);
        u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
    };

    match (width, height) {
        (0, 0) => (src_width.max(1), src_height.max(1)),
        (w, 0) => (w, scale(w, src_height, src_width)),
        (0, h) => (scale(h, src_width, src_height), h),
        (w, h) => (w, h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case((240, 160), (120, 0), (120, 80))]
    #[case((240, 160), (0, 80), (120, 80))]
    #[case((1000, 10), (300, 0), (300, 3))]
    #[case((1000, 1), (300, 0), (300, 1))]
    #[case((640, 480), (50, 60), (50, 60))]
    #[case((640, 480), (0, 0), (640, 480))]
    fn test_target_dimensions(
        #[case] src: (u32, u32),
        #[case] requested: (u32, u32),
        #[case] expected: (u32, u32),
    ) {
        assert_eq!(
            target_dimensions(src.0, src.1, requested.0, requested.1),
            expected
        );
    }

    #[test]
    fn test_job_display() {
        let job = RenderJob::new("abc123", 120, 0);
        assert_eq!(job.to_string(), "abc123@120x0");
        let job = job.with_format(Some(OutputFormat::Jpeg));
        assert_eq!(job.to_string(), "abc123@120x0.jpg");
    }
}
