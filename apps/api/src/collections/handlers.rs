use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::collections::service::{CreateCollection, UpdateCollection};
use crate::errors::{AppError, JsonBody};
use crate::guard::Entity;
use crate::models::collection::{Collection, CollectionWithCount};
use crate::models::snippet::Snippet;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSnippet {
    pub snippet_id: Option<String>,
}

#[derive(Serialize)]
pub struct CollectionResponse {
    pub success: bool,
    pub collection: Collection,
}

#[derive(Serialize)]
pub struct CollectionListResponse {
    pub collections: Vec<CollectionWithCount>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct CollectionSnippetsResponse {
    pub collection: Collection,
    pub snippets: Vec<Snippet>,
    pub count: usize,
}

/// POST /api/collections
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(req): JsonBody<CreateCollection>,
) -> Result<(StatusCode, Json<CollectionResponse>), AppError> {
    let collection = state.collections.create(user.id(), req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CollectionResponse {
            success: true,
            collection,
        }),
    ))
}

/// GET /api/collections
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CollectionListResponse>, AppError> {
    let collections = state.collections.list(user.id()).await?;
    Ok(Json(CollectionListResponse {
        count: collections.len(),
        collections,
    }))
}

/// GET /api/collections/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    let collection = state.collections.get(user.id(), id).await?;
    Ok(Json(json!({ "collection": collection })))
}

/// PUT /api/collections/:id
pub async fn handle_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateCollection>,
) -> Result<Json<CollectionResponse>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    let collection = state.collections.update(user.id(), id, req).await?;
    Ok(Json(CollectionResponse {
        success: true,
        collection,
    }))
}

/// DELETE /api/collections/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    state.collections.delete(user.id(), id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Collection deleted successfully"
    })))
}

/// POST /api/collections/:id/snippets
pub async fn handle_add_snippet(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AddSnippet>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    let snippet_id = req
        .snippet_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation("snippetId is required"))?;
    let snippet_id = Entity::Snippet.parse_id(snippet_id)?;

    state
        .collections
        .add_snippet(user.id(), id, snippet_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Snippet added to collection"
    })))
}

/// GET /api/collections/:id/snippets
pub async fn handle_list_snippets(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CollectionSnippetsResponse>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    let (collection, snippets) = state.collections.snippets(user.id(), id).await?;
    Ok(Json(CollectionSnippetsResponse {
        collection,
        count: snippets.len(),
        snippets,
    }))
}

/// DELETE /api/collections/:id/snippets/:snippet_id
pub async fn handle_remove_snippet(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, snippet_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let id = Entity::Collection.parse_id(&id)?;
    let snippet_id = Entity::Snippet.parse_id(&snippet_id)?;
    state
        .collections
        .remove_snippet(user.id(), id, snippet_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Snippet removed from collection"
    })))
}
