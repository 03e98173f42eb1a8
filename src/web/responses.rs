//! Response helpers
//!
//! Every failure a handler can produce ends as a redirect to the home page,
//! optionally tagged with a short marker such as `/?limit`. Clients never
//! see an error body.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, warn};

use crate::cache::Payload;
use crate::errors::{AppError, PipelineError};

/// Redirect to `/`, or `/?{marker}` when a marker is given
pub fn redirect_home(marker: Option<&str>, status: StatusCode) -> Response {
    let location = match marker {
        Some(marker) => format!("/?{marker}"),
        None => "/".to_string(),
    };
    (status, [(header::LOCATION, location)]).into_response()
}

/// Plain `302 Found` redirect
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Image bytes with their content type
pub fn image(payload: Payload) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, payload.content_type)
        .header(header::CONTENT_LENGTH, payload.bytes.len())
        .body(Body::from(payload.bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

impl AppError {
    /// Status code of the redirect this error becomes
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RateLimited { .. } | AppError::MalformedUpload { .. } => {
                StatusCode::FORBIDDEN
            }
            AppError::Pipeline(PipelineError::Timeout(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::InvalidRequest { .. } => debug!(error = %self, "Rejected request"),
            AppError::RateLimited { .. } => info!(error = %self, "Not serving, rate limited"),
            AppError::NotFound { .. } | AppError::MalformedUpload { .. } => {
                warn!(error = %self, "Request failed")
            }
            AppError::Pipeline(err) if err.is_client_error() => {
                debug!(error = %self, "Rejected request")
            }
            AppError::Pipeline(_) => warn!(error = %self, "Render failed"),
            AppError::Storage(_) | AppError::Internal { .. } => {
                error!(error = %self, "Request failed")
            }
        }

        redirect_home(self.marker(), self.status_code())
    }
}
