//! Image handlers
//!
//! `GET /{id}[.ext]` serves a stored original. `GET /{w}/{h}/{id}[.ext]`
//! and `GET /{id}[.ext]/{w}/{h}` serve a resized rendering; the extension
//! pins the output format and its absence lets the encoders race.

use axum::{
    extract::{Path, State},
    http::Uri,
    response::Response,
};

use crate::errors::{AppError, AppResult};
use crate::pipeline::RenderJob;
use crate::services::ImageRequest;
use crate::web::{
    AppState,
    extractors::{ClientId, Identifier, classify_identifier, parse_dimension},
    responses,
};

/// Serve a stored original unmodified
pub async fn original(
    State(state): State<AppState>,
    client: ClientId,
    Path(file): Path<String>,
    uri: Uri,
) -> AppResult<Response> {
    let Identifier { id, .. } = classify_identifier(&file, state.id_length())
        .ok_or_else(|| AppError::invalid_request(format!("unusable identifier '{file}'")))?;

    let request = ImageRequest::Original { id };
    serve(&state, &client, &request, &uri).await
}

/// Serve a resized rendering from either path layout
pub async fn resize(
    State(state): State<AppState>,
    client: ClientId,
    Path((first, second, third)): Path<(String, String, String)>,
    uri: Uri,
) -> AppResult<Response> {
    let job = parse_resize_path(&first, &second, &third, state.id_length()).ok_or_else(|| {
        AppError::invalid_request(format!("unusable resize path {}", uri.path()))
    })?;

    let request = ImageRequest::Resize(job);
    serve(&state, &client, &request, &uri).await
}

/// Resolve `/{w}/{h}/{id}` first, then `/{id}/{w}/{h}`
pub fn parse_resize_path(first: &str, second: &str, third: &str, id_length: usize) -> Option<RenderJob> {
    let leading = || {
        let width = parse_dimension(first)?;
        let height = parse_dimension(second)?;
        let ident = classify_identifier(third, id_length)?;
        Some((ident, width, height))
    };
    let trailing = || {
        let ident = classify_identifier(first, id_length)?;
        let width = parse_dimension(second)?;
        let height = parse_dimension(third)?;
        Some((ident, width, height))
    };

    let (ident, width, height) = leading().or_else(trailing)?;
    Some(RenderJob::new(ident.id, width, height).with_format(ident.format))
}

async fn serve(
    state: &AppState,
    client: &ClientId,
    request: &ImageRequest,
    uri: &Uri,
) -> AppResult<Response> {
    let key = state.cache_keys.key_for(uri.path(), uri.query());
    let payload = state
        .thumbnails
        .fetch(client.as_str(), request, key.as_ref())
        .await?;
    Ok(responses::image(payload))
}
