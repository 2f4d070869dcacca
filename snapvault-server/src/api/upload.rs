//! Multipart upload into the local media store

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use snapvault_common::models::{Image, NewImage};
use tracing::info;

use crate::auth::AuthUser;
use crate::db::images;
use crate::{ApiError, ApiResult, AppState};

/// Slack for multipart boundaries and the text fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// POST /api/images/upload
///
/// Fields: `file` (required) and `filename` (display name, defaults to the
/// uploaded file's name).
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<Image>> {
    let media = state
        .media
        .clone()
        .ok_or_else(|| ApiError::NotFound("Uploads are not enabled".to_string()))?;

    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut display_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let original_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                file = Some((original_name, bytes.to_vec()));
            }
            Some("filename") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                display_name = Some(text.trim().to_string()).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    let (original_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing required field: file".to_string()))?;
    let filename = display_name
        .or(original_name)
        .ok_or_else(|| ApiError::BadRequest("Missing required field: filename".to_string()))?;

    let stored = media.store(&user.id, bytes).await?;

    let image = images::insert_image(
        &state.db,
        &user.id,
        &NewImage {
            filename,
            original_path: stored.original_url,
            thumbnail_path: Some(stored.thumbnail_url),
        },
    )
    .await?;

    info!(image_id = image.id, user_id = %user.id, "Upload stored");
    Ok(Json(image))
}

/// Build upload routes (authenticated)
pub fn upload_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/images/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}
