//! Web layer module
//!
//! HTTP interface of the thumbnail server. Handlers are thin and delegate to
//! [`ThumbnailService`]; cross-cutting concerns live in middleware.
//!
//! # Routes
//!
//! - `GET /` upload form, never rate limited
//! - `GET /health` JSON status and counters
//! - `POST /upload` store a new original
//! - `GET /{id}[.ext]` original bytes
//! - `GET /{w}/{h}/{id}[.ext]` and `GET /{id}[.ext]/{w}/{h}` resized render
//!
//! Image and upload routes run behind the ingress middleware (blocked-client
//! check and admission gate). Anything unmatched redirects to `/`.

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{
    cache::{CacheKeyMatcher, RenderCache},
    config::Config,
    limiter::{AdmissionGate, RateLimitPolicy, RateLimiter},
    pipeline::{ImagePipeline, RenderLimits},
    services::ThumbnailService,
    storage::{IdGenerator, OriginalStore},
};

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;

pub use extractors::{ClientId, Identifier, classify_identifier};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub thumbnails: ThumbnailService,
    pub gate: AdmissionGate,
    pub cache_keys: Arc<CacheKeyMatcher>,
}

impl AppState {
    pub fn new(config: Arc<Config>, thumbnails: ThumbnailService, gate: AdmissionGate) -> Result<Self> {
        let cache_keys = Arc::new(CacheKeyMatcher::new(config.storage.id_length)?);
        Ok(Self {
            config,
            thumbnails,
            gate,
            cache_keys,
        })
    }

    /// Wire every component from configuration around the given store
    pub fn from_config(config: Config, store: Arc<dyn OriginalStore>) -> Result<Self> {
        let thumbnails = ThumbnailService::new(
            store,
            IdGenerator::new(config.storage.id_length),
            Arc::new(RateLimiter::new(RateLimitPolicy::from(&config.limits))),
            RenderCache::new(config.cache.ttl),
            Arc::new(ImagePipeline::new(RenderLimits::from(&config.render))),
        );
        let gate = AdmissionGate::new(config.limits.max_concurrent);
        Self::new(Arc::new(config), thumbnails, gate)
    }

    pub fn id_length(&self) -> usize {
        self.config.storage.id_length
    }
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route("/{file}", get(handlers::images::original))
        .route("/{first}/{second}/{third}", get(handlers::images::resize))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::ingress_middleware,
        ));

    Router::new()
        .route("/", get(handlers::index::index))
        .route("/health", get(handlers::health::health_check))
        .merge(guarded)
        .fallback(handlers::index::fallback)
        .method_not_allowed_fallback(handlers::index::fallback)
        .layer(DefaultBodyLimit::max(state.config.web.max_upload_size))
        .layer(from_fn(middleware::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until Ctrl-C. Client identity comes from the peer address.
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Web server listening on http://{}", self.addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
