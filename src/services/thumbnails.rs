//! Thumbnail service
//!
//! Orchestrates one image request: consult the render cache, charge the
//! client's rate budget on a miss, load the original and render it. Uploads
//! are charged up front and stored under a freshly reserved identifier.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{Acquired, CacheKey, CacheStats, Payload, RenderCache};
use crate::errors::{AppError, AppResult};
use crate::limiter::{Admission, RateLimiter, RequestClass};
use crate::pipeline::{ImagePipeline, PipelineStats, RenderJob, sniff_content_type};
use crate::storage::{IdGenerator, OriginalStore};

/// What a client asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRequest {
    /// Stored bytes, unmodified
    Original { id: String },
    /// A resized rendering
    Resize(RenderJob),
}

impl ImageRequest {
    pub fn id(&self) -> &str {
        match self {
            ImageRequest::Original { id } => id,
            ImageRequest::Resize(job) => &job.id,
        }
    }
}

/// Snapshot for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub cache: CacheStats,
    pub render: PipelineStats,
    pub tracked_clients: usize,
}

#[derive(Clone)]
pub struct ThumbnailService {
    store: Arc<dyn OriginalStore>,
    ids: IdGenerator,
    limiter: Arc<RateLimiter>,
    cache: RenderCache,
    pipeline: Arc<ImagePipeline>,
}

impl ThumbnailService {
    pub fn new(
        store: Arc<dyn OriginalStore>,
        ids: IdGenerator,
        limiter: Arc<RateLimiter>,
        cache: RenderCache,
        pipeline: Arc<ImagePipeline>,
    ) -> Self {
        Self {
            store,
            ids,
            limiter,
            cache,
            pipeline,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn pipeline(&self) -> &ImagePipeline {
        &self.pipeline
    }

    /// Deny a blocked client before any other work, cache hits included
    pub fn ensure_not_blocked(&self, client: &str) -> AppResult<()> {
        match self.limiter.blocked_remaining(client) {
            Some(retry_after) => Err(AppError::RateLimited {
                client: client.to_string(),
                retry_after,
            }),
            None => Ok(()),
        }
    }

    /// Charge a request against the client's budget
    pub fn charge(&self, client: &str, class: RequestClass) -> AppResult<()> {
        match self.limiter.admit(client, class) {
            Admission::Allow => Ok(()),
            Admission::Deny { blocked_remaining } => Err(AppError::RateLimited {
                client: client.to_string(),
                retry_after: blocked_remaining,
            }),
        }
    }

    /// Store a new original and return its identifier
    pub async fn store_upload(&self, client: &str, contents: Bytes) -> AppResult<String> {
        let id = self.ids.new_unique_id(self.store.as_ref()).await?;
        if let Err(e) = self.store.write(&id, &contents).await {
            if let Err(discard) = self.store.discard(&id).await {
                warn!(id = %id, error = %discard, "Failed to discard reservation");
            }
            return Err(e.into());
        }
        info!(client = %client, id = %id, size_bytes = contents.len(), "Stored upload");
        Ok(id)
    }

    /// Serve an original or a rendering, going through the cache when the
    /// request has a cache key
    pub async fn fetch(
        &self,
        client: &str,
        request: &ImageRequest,
        key: Option<&CacheKey>,
    ) -> AppResult<Payload> {
        if let ImageRequest::Resize(job) = request {
            self.pipeline.validate(job.width, job.height)?;
        }

        let Some(key) = key else {
            return self.produce(client, request).await;
        };

        match self.cache.acquire(key.as_str()).await {
            Acquired::Hit(payload) => {
                debug!(client = %client, key = %key, "Cache hit");
                Ok(payload)
            }
            Acquired::Fill(guard) => {
                // An error here drops the guard, which abandons the fill.
                let payload = self.produce(client, request).await?;
                guard.complete(payload.clone());
                Ok(payload)
            }
        }
    }

    async fn produce(&self, client: &str, request: &ImageRequest) -> AppResult<Payload> {
        self.charge(client, RequestClass::Read)?;

        let id = request.id();
        // An empty original is a reservation whose upload has not landed.
        let original = self
            .store
            .read(id)
            .await?
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| AppError::not_found(id))?;

        match request {
            ImageRequest::Original { .. } => {
                let content_type = sniff_content_type(&original);
                Ok(Payload::new(original, content_type))
            }
            ImageRequest::Resize(job) => {
                let rendered = self.pipeline.render(job, original).await?;
                Ok(Payload::new(rendered.bytes, rendered.format.mime_type()))
            }
        }
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            cache: self.cache.stats(),
            render: self.pipeline.stats(),
            tracked_clients: self.limiter.tracked_clients(),
        }
    }
}
