//! Profile routes for the authenticated user.

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::info;

use domain::models::UserResponse;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::middleware::metrics::record_avatar_uploaded;
use crate::services::avatar::{resolve_content_type, validate_upload};

/// Multipart field carrying the image.
const AVATAR_FIELD: &str = "file";

/// `GET /api/users/me`
pub async fn get_current_user(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

/// `PATCH /api/users/avatar` with a multipart `file` field.
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from)?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }

        let content_type = resolve_content_type(field.content_type(), field.file_name());
        let bytes = field
            .bytes()
            .await
            .map_err(ApiError::from)?;
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| ApiError::validation("Missing multipart field 'file'"))?;

    let extension = validate_upload(
        &content_type,
        bytes.len(),
        state.config.storage.max_avatar_bytes,
    )?;

    let url = state
        .avatars
        .upload(&user, bytes.to_vec(), extension)
        .await?;
    let updated = state.auth.update_avatar(&user.email, &url).await?;

    record_avatar_uploaded(state.avatars.name());
    info!(user_id = %user.id, provider = state.avatars.name(), "Avatar updated");

    Ok(Json(updated.into()))
}
