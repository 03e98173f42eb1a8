//! Upload handler

use axum::{
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    response::Response,
};
use bytes::Bytes;

use crate::errors::{AppError, AppResult};
use crate::limiter::RequestClass;
use crate::web::{AppState, extractors::ClientId, responses};

const FILE_FIELD: &str = "file";

/// Accept a multipart upload and redirect to its default thumbnail.
///
/// A malformed form or a missing `file` field is rejected before anything
/// is charged or stored.
pub async fn upload(
    State(state): State<AppState>,
    client: ClientId,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let mut multipart = multipart.map_err(|e| AppError::malformed_upload(e.body_text()))?;
    let contents = read_file_field(&mut multipart).await?;

    state
        .thumbnails
        .charge(client.as_str(), RequestClass::Write)?;
    let id = state
        .thumbnails
        .store_upload(client.as_str(), contents)
        .await?;

    let width = state.config.render.default_thumbnail_width;
    Ok(responses::found(&format!("/{width}/0/{id}")))
}

async fn read_file_field(multipart: &mut Multipart) -> AppResult<Bytes> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let contents = field.bytes().await.map_err(malformed)?;
        if contents.is_empty() {
            return Err(AppError::malformed_upload("empty file field"));
        }
        return Ok(contents);
    }
    Err(AppError::malformed_upload("missing file field"))
}

fn malformed(e: MultipartError) -> AppError {
    AppError::malformed_upload(e.body_text())
}
