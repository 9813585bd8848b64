use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::errors::{AppError, JsonBody};
use crate::guard::Entity;
use crate::models::snippet::Snippet;
use crate::models::tag::{Tag, TagWithCount};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateTag {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct TagSnippetsResponse {
    pub tag: Tag,
    pub snippets: Vec<Snippet>,
    pub count: usize,
}

/// POST /api/tags
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreateTag>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let tag = state
        .tags
        .create(user.id(), req.name.as_deref().unwrap_or_default())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "tag": tag })),
    ))
}

/// GET /api/tags
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TagListResponse>, AppError> {
    let tags = state.tags.list(user.id()).await?;
    Ok(Json(TagListResponse {
        count: tags.len(),
        tags,
    }))
}

/// GET /api/tags/:id/snippets
pub async fn handle_snippets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TagSnippetsResponse>, AppError> {
    let id = Entity::Tag.parse_id(&id)?;
    let (tag, snippets) = state.tags.snippets(user.id(), id).await?;
    Ok(Json(TagSnippetsResponse {
        tag,
        count: snippets.len(),
        snippets,
    }))
}

/// DELETE /api/tags/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Tag.parse_id(&id)?;
    state.tags.delete(user.id(), id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Tag deleted successfully"
    })))
}
