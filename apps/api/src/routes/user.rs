use axum::Json;
use serde_json::{json, Value};

use crate::auth::AuthUser;

/// GET /api/user/me
pub async fn handle_me(AuthUser(identity): AuthUser) -> Json<Value> {
    Json(json!({ "user": identity }))
}
