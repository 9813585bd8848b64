use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::guard::Entity;
use crate::images::service::Upload;
use crate::models::image::{Image, ImageStats};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ImageListResponse {
    pub images: Vec<Image>,
    pub stats: ImageStats,
}

/// POST /api/images/upload
///
/// Multipart fields: `file` (required) and `snippetId` (optional).
pub async fn handle_upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut upload: Option<Upload> = None;
    let mut snippet_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(String::from);
        match name.as_deref() {
            Some("file") => {
                let declared_type = field.content_type().map(String::from);
                let file_name = field.file_name().map(String::from);
                let bytes = field.bytes().await?;
                upload = Some(Upload {
                    bytes,
                    declared_type,
                    file_name,
                });
            }
            Some("snippetId") => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    snippet_id = Some(Entity::Snippet.parse_id(&raw)?);
                }
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::validation("No file provided"))?;
    let image = state.images.upload(user.id(), upload, snippet_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "image": image })),
    ))
}

/// GET /api/images
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ImageListResponse>, AppError> {
    let (images, stats) = state.images.list(user.id()).await?;
    Ok(Json(ImageListResponse { images, stats }))
}

/// GET /api/images/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Image.parse_id(&id)?;
    let image = state.images.get(user.id(), id).await?;
    Ok(Json(json!({ "image": image })))
}

/// DELETE /api/images/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Image.parse_id(&id)?;
    state.images.delete(user.id(), id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Image deleted"
    })))
}
