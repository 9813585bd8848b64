use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{AppError, JsonBody};
use crate::guard::Entity;
use crate::models::image::Image;
use crate::models::snippet::Snippet;
use crate::models::tag::Tag;
use crate::snippets::service::{AddTag, CreateSnippet, UpdateSnippet};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct SnippetResponse {
    pub success: bool,
    pub snippet: Snippet,
}

#[derive(Serialize)]
pub struct SnippetListResponse {
    pub snippets: Vec<Snippet>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl SnippetListResponse {
    fn new(snippets: Vec<Snippet>, query: Option<String>) -> Self {
        let count = snippets.len();
        SnippetListResponse {
            snippets,
            count,
            query,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetTagsResponse {
    pub snippet_id: Uuid,
    pub tags: Vec<Tag>,
    pub count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetImagesResponse {
    pub snippet_id: Uuid,
    pub images: Vec<Image>,
    pub count: usize,
}

/// POST /api/snippets
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreateSnippet>,
) -> Result<(StatusCode, Json<SnippetResponse>), AppError> {
    let snippet = state.snippets.create(user.id(), req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SnippetResponse {
            success: true,
            snippet,
        }),
    ))
}

/// GET /api/snippets?type=
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<SnippetListResponse>, AppError> {
    let snippets = state
        .snippets
        .list(user.id(), params.kind.as_deref())
        .await?;
    Ok(Json(SnippetListResponse::new(snippets, None)))
}

/// GET /api/snippets/search?q=
pub async fn handle_search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SnippetListResponse>, AppError> {
    let snippets = state.snippets.search(user.id(), params.q.as_deref()).await?;
    Ok(Json(SnippetListResponse::new(snippets, params.q)))
}

/// GET /api/snippets/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Snippet.parse_id(&id)?;
    let snippet = state.snippets.get(user.id(), id).await?;
    Ok(Json(json!({ "snippet": snippet })))
}

/// PUT /api/snippets/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateSnippet>,
) -> Result<Json<SnippetResponse>, AppError> {
    let id = Entity::Snippet.parse_id(&id)?;
    let snippet = state.snippets.update(user.id(), id, req).await?;
    Ok(Json(SnippetResponse {
        success: true,
        snippet,
    }))
}

/// DELETE /api/snippets/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Snippet.parse_id(&id)?;
    state.snippets.delete(user.id(), id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Snippet deleted successfully"
    })))
}

/// POST /api/snippets/:id/tags
pub async fn handle_add_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AddTag>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Snippet.parse_id(&id)?;
    let tag = state.snippets.add_tag(user.id(), id, req).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Tag added to snippet",
        "tag": tag
    })))
}

/// GET /api/snippets/:id/tags
pub async fn handle_list_tags(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SnippetTagsResponse>, AppError> {
    let snippet_id = Entity::Snippet.parse_id(&id)?;
    let tags = state.snippets.list_tags(user.id(), snippet_id).await?;
    Ok(Json(SnippetTagsResponse {
        snippet_id,
        count: tags.len(),
        tags,
    }))
}

/// DELETE /api/snippets/:id/tags/:tag_id
pub async fn handle_remove_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, tag_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Snippet.parse_id(&id)?;
    let tag_id = Entity::Tag.parse_id(&tag_id)?;
    state.snippets.remove_tag(user.id(), id, tag_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Tag removed from snippet"
    })))
}

/// GET /api/snippets/:id/images
pub async fn handle_list_images(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SnippetImagesResponse>, AppError> {
    let snippet_id = Entity::Snippet.parse_id(&id)?;
    let images = state.snippets.list_images(user.id(), snippet_id).await?;
    Ok(Json(SnippetImagesResponse {
        snippet_id,
        count: images.len(),
        images,
    }))
}
