//! Image rendering pipeline
//!
//! Decodes a stored original, resizes it with Lanczos3 and encodes the
//! result. The caller either pins an output format or lets every supported
//! encoder race, in which case the first encoder to succeed wins and the
//! others are discarded.
//!
//! All CPU work runs on the blocking thread pool. Resize and encode together
//! are bounded by the configured render timeout; when it expires the caller
//! gets [`PipelineError::Timeout`] and whatever the background work produces
//! later is dropped.

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tracing::{debug, instrument, warn};

use crate::config::RenderConfig;
use crate::errors::{PipelineError, PipelineResult};

pub mod format;
pub mod job;

pub use format::{OutputFormat, sniff_content_type};
pub use job::{RenderJob, RenderedImage, target_dimensions};

/// Bounds applied to every render
#[derive(Debug, Clone)]
pub struct RenderLimits {
    pub max_dimension: u32,
    pub min_dimension: u32,
    pub timeout: Duration,
}

impl From<&RenderConfig> for RenderLimits {
    fn from(config: &RenderConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
            min_dimension: config.min_dimension,
            timeout: config.timeout,
        }
    }
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

/// Counters reported on the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub renders: u64,
    pub timeouts: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct ImagePipeline {
    limits: RenderLimits,
    renders: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
}

impl ImagePipeline {
    pub fn new(limits: RenderLimits) -> Self {
        Self {
            limits,
            renders: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> &RenderLimits {
        &self.limits
    }

    /// Reject sizes outside the accepted range.
    ///
    /// Either side above the maximum is rejected, as is a request where both
    /// sides are below the minimum. A single zero side means "scale".
    pub fn validate(&self, width: u32, height: u32) -> PipelineResult<()> {
        let too_large = width > self.limits.max_dimension || height > self.limits.max_dimension;
        let too_small = width < self.limits.min_dimension && height < self.limits.min_dimension;
        if too_large || too_small {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        Ok(())
    }

    /// Reject a final output size with either side above the maximum.
    ///
    /// A side derived from a zero request follows the source aspect ratio,
    /// so an extreme source can push it far past what [`validate`](Self::validate)
    /// saw.
    pub fn check_output(&self, width: u32, height: u32) -> PipelineResult<()> {
        if width > self.limits.max_dimension || height > self.limits.max_dimension {
            return Err(PipelineError::InvalidDimensions { width, height });
        }
        Ok(())
    }

    /// Render `original` for `job`
    #[instrument(skip(self, job, original), fields(job = %job, original_bytes = original.len()))]
    pub async fn render(&self, job: &RenderJob, original: Bytes) -> PipelineResult<RenderedImage> {
        self.validate(job.width, job.height)?;
        self.renders.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let result = self.run(job, original).await;

        match &result {
            Ok(rendered) => debug!(
                format = %rendered.format,
                width = rendered.width,
                height = rendered.height,
                size_bytes = rendered.bytes.len(),
                duration_ms = started.elapsed().as_millis(),
                "Render complete"
            ),
            Err(PipelineError::Timeout(limit)) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(timeout_ms = limit.as_millis(), "Render timed out");
            }
            Err(e) if e.is_client_error() => debug!(error = %e, "Render rejected"),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Render failed");
            }
        }

        result
    }

    async fn run(&self, job: &RenderJob, original: Bytes) -> PipelineResult<RenderedImage> {
        let decoded = decode(original).await?;

        let (src_width, src_height) = decoded.dimensions();
        let (width, height) = target_dimensions(src_width, src_height, job.width, job.height);
        self.check_output(width, height)?;
        let pinned = job.format;

        let timeout = self.limits.timeout;
        match tokio::time::timeout(timeout, resize_and_encode(decoded, width, height, pinned)).await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(timeout)),
        }
    }

    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            renders: self.renders(),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ImagePipeline {
    fn default() -> Self {
        Self::new(RenderLimits::default())
    }
}

async fn decode(original: Bytes) -> PipelineResult<DynamicImage> {
    spawn_blocking(move || image::load_from_memory(&original))
        .await
        .map_err(|e| PipelineError::Task(format!("decode task panicked: {e}")))?
        .map_err(PipelineError::Decode)
}

async fn resize_and_encode(
    decoded: DynamicImage,
    width: u32,
    height: u32,
    pinned: Option<OutputFormat>,
) -> PipelineResult<RenderedImage> {
    let resized = spawn_blocking(move || decoded.resize_exact(width, height, FilterType::Lanczos3))
        .await
        .map_err(|e| PipelineError::Task(format!("resize task panicked: {e}")))?;
    let resized = Arc::new(resized);

    let (bytes, format) = match pinned {
        Some(format) => {
            let image = resized.clone();
            let bytes = spawn_blocking(move || encode(&image, format))
                .await
                .map_err(|e| PipelineError::Task(format!("encode task panicked: {e}")))??;
            (bytes, format)
        }
        None => race_encoders(resized.clone()).await?,
    };

    Ok(RenderedImage {
        bytes,
        format,
        width: resized.width(),
        height: resized.height(),
    })
}

/// Run every encoder concurrently and keep the first success.
///
/// The channel holds one slot per encoder so no sender ever waits. Dropping
/// the receiver after the first success discards the remaining results.
async fn race_encoders(image: Arc<DynamicImage>) -> PipelineResult<(Bytes, OutputFormat)> {
    let (tx, mut rx) = mpsc::channel(OutputFormat::ALL.len());

    for format in OutputFormat::ALL {
        let tx = tx.clone();
        let image = image.clone();
        spawn_blocking(move || {
            let result = encode(&image, format).map(|bytes| (bytes, format));
            let _ = tx.try_send(result);
        });
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        match result {
            Ok(winner) => {
                debug!(format = %winner.1, "Format race won");
                return Ok(winner);
            }
            Err(e) => debug!(error = %e, "Encoder dropped out of format race"),
        }
    }

    Err(PipelineError::NoEncoderSucceeded)
}

fn encode(image: &DynamicImage, format: OutputFormat) -> PipelineResult<Bytes> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    // JPEG has no alpha channel, the others take RGBA.
    let prepared = match format {
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        OutputFormat::Png | OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
    };

    prepared
        .write_to(&mut cursor, format.image_format())
        .map_err(|source| PipelineError::Encode { format, source })?;

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use rstest::rstest;

    fn sample_png(width: u32, height: u32) -> Bytes {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    #[rstest]
    #[case(120, 0, true)]
    #[case(0, 120, true)]
    #[case(10_000, 10_000, true)]
    #[case(2, 500, true)]
    #[case(10_001, 10, false)]
    #[case(10, 10_001, false)]
    #[case(2, 2, false)]
    #[case(0, 0, false)]
    fn test_validate(#[case] width: u32, #[case] height: u32, #[case] ok: bool) {
        let pipeline = ImagePipeline::default();
        assert_eq!(pipeline.validate(width, height).is_ok(), ok);
    }

    #[tokio::test]
    async fn test_invalid_dimensions_never_reach_render() {
        let pipeline = ImagePipeline::default();
        let job = RenderJob::new("abc123", 20_000, 1);
        let err = pipeline.render(&job, sample_png(4, 4)).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDimensions { .. }));
        assert_eq!(pipeline.renders(), 0);
    }

    #[tokio::test]
    async fn test_width_only_preserves_aspect_ratio() {
        let pipeline = ImagePipeline::default();
        let job = RenderJob::new("abc123", 300, 0).with_format(Some(OutputFormat::Png));
        let rendered = pipeline.render(&job, sample_png(600, 400)).await.unwrap();

        assert_eq!((rendered.width, rendered.height), (300, 200));
        let decoded = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (300, 200));
    }

    #[rstest]
    #[case(OutputFormat::Png)]
    #[case(OutputFormat::Jpeg)]
    #[case(OutputFormat::Gif)]
    #[tokio::test]
    async fn test_pinned_format_is_honoured(#[case] format: OutputFormat) {
        let pipeline = ImagePipeline::default();
        let job = RenderJob::new("abc123", 32, 32).with_format(Some(format));
        let rendered = pipeline.render(&job, sample_png(64, 64)).await.unwrap();

        assert_eq!(rendered.format, format);
        assert_eq!(OutputFormat::sniff(&rendered.bytes), Some(format));
    }

    #[tokio::test]
    async fn test_format_race_declares_matching_format() {
        let pipeline = ImagePipeline::default();
        for _ in 0..5 {
            let job = RenderJob::new("abc123", 40, 0);
            let rendered = pipeline.render(&job, sample_png(80, 60)).await.unwrap();
            assert_eq!(OutputFormat::sniff(&rendered.bytes), Some(rendered.format));
        }
        assert_eq!(pipeline.renders(), 5);
    }

    #[rstest]
    #[case((1, 200), (10_000, 0))]
    #[case((200, 1), (0, 10_000))]
    #[case((3, 10_000), (5_000, 0))]
    #[tokio::test]
    async fn test_derived_side_over_maximum_is_rejected(
        #[case] source: (u32, u32),
        #[case] requested: (u32, u32),
    ) {
        let pipeline = ImagePipeline::default();
        assert!(pipeline.validate(requested.0, requested.1).is_ok());

        let job = RenderJob::new("abc123", requested.0, requested.1);
        let err = pipeline
            .render(&job, sample_png(source.0, source.1))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidDimensions { .. }));
        assert_eq!(pipeline.stats().failures, 0);
    }

    #[rstest]
    #[case(10_000, 10_000, true)]
    #[case(10_001, 1, false)]
    #[case(1, 2_000_000, false)]
    #[case(1, 1, true)]
    fn test_check_output(#[case] width: u32, #[case] height: u32, #[case] ok: bool) {
        let pipeline = ImagePipeline::default();
        assert_eq!(pipeline.check_output(width, height).is_ok(), ok);
    }

    #[tokio::test]
    async fn test_undecodable_original_fails() {
        let pipeline = ImagePipeline::default();
        let job = RenderJob::new("abc123", 10, 10);
        let err = pipeline
            .render(&job, Bytes::from_static(b"definitely not an image"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(pipeline.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_render_times_out() {
        let pipeline = ImagePipeline::new(RenderLimits {
            timeout: Duration::ZERO,
            ..RenderLimits::default()
        });
        let job = RenderJob::new("abc123", 1_500, 1_500);
        let err = pipeline.render(&job, sample_png(64, 64)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Timeout(_)));
        assert_eq!(pipeline.stats().timeouts, 1);
    }
}
