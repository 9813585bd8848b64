pub mod health;
pub mod user;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::collections::handlers as collections;
use crate::errors::AppError;
use crate::images::handlers as images;
use crate::snippets::handlers as snippets;
use crate::state::AppState;
use crate::tags::handlers as tags;

/// Room for multipart framing and the `snippetId` field on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

async fn not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.images.policy().max_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/user/me", get(user::handle_me))
        // Snippets
        .route(
            "/api/snippets",
            post(snippets::handle_create).get(snippets::handle_list),
        )
        .route("/api/snippets/search", get(snippets::handle_search))
        .route(
            "/api/snippets/:id",
            get(snippets::handle_get)
                .put(snippets::handle_update)
                .delete(snippets::handle_delete),
        )
        .route(
            "/api/snippets/:id/tags",
            post(snippets::handle_add_tag).get(snippets::handle_list_tags),
        )
        .route(
            "/api/snippets/:id/tags/:tag_id",
            delete(snippets::handle_remove_tag),
        )
        .route("/api/snippets/:id/images", get(snippets::handle_list_images))
        // Tags
        .route("/api/tags", post(tags::handle_create).get(tags::handle_list))
        .route("/api/tags/:id", delete(tags::handle_delete))
        .route("/api/tags/:id/snippets", get(tags::handle_snippets))
        // Collections
        .route(
            "/api/collections",
            post(collections::handle_create).get(collections::handle_list),
        )
        .route(
            "/api/collections/:id",
            get(collections::handle_get)
                .put(collections::handle_update)
                .delete(collections::handle_delete),
        )
        .route(
            "/api/collections/:id/snippets",
            post(collections::handle_add_snippet).get(collections::handle_list_snippets),
        )
        .route(
            "/api/collections/:id/snippets/:snippet_id",
            delete(collections::handle_remove_snippet),
        )
        // Images
        .route(
            "/api/images/upload",
            post(images::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/images", get(images::handle_list))
        .route(
            "/api/images/:id",
            get(images::handle_get).delete(images::handle_delete),
        )
        .fallback(not_found)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, ALICE_TOKEN, BOB_TOKEN};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(harness().state);
        let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "stashit-api");
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        let app = build_router(harness().state);
        for uri in ["/api/snippets", "/api/tags", "/api/collections", "/api/images", "/api/user/me"] {
            let (status, body) = send(&app, request(Method::GET, uri, None, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
        let (status, _) = send(
            &app,
            request(Method::GET, "/api/snippets", Some("expired-or-made-up"), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_me() {
        let app = build_router(harness().state);
        let (status, body) = send(&app, request(Method::GET, "/api/user/me", Some(ALICE_TOKEN), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], "alice");
        assert_eq!(body["user"]["emailVerified"], true);
    }

    #[tokio::test]
    async fn test_snippet_lifecycle_over_http() {
        let app = build_router(harness().state);
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/snippets",
                Some(ALICE_TOKEN),
                Some(json!({
                    "type": "quote",
                    "content": "hello world",
                    "metadata": { "source": "Book X", "page": 42 }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        let id = body["snippet"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["snippet"]["type"], "quote");
        assert_eq!(
            body["snippet"]["metadata"].to_string(),
            r#"{"source":"Book X","page":42}"#
        );

        let (status, body) = send(
            &app,
            request(Method::GET, &format!("/api/snippets/{id}"), Some(ALICE_TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snippet"]["content"], "hello world");
        assert!(body["snippet"]["createdAt"].is_string());

        let (status, body) = send(
            &app,
            request(Method::GET, "/api/snippets/search?q=HELLO", Some(ALICE_TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["query"], "HELLO");

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                &format!("/api/snippets/{id}/tags"),
                Some(ALICE_TOKEN),
                Some(json!({ "tagName": "Books" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tag"]["name"], "books");

        let (status, body) = send(
            &app,
            request(
                Method::POST,
                &format!("/api/snippets/{id}/tags"),
                Some(ALICE_TOKEN),
                Some(json!({ "tagName": "books" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "DUPLICATE");

        let (status, body) = send(
            &app,
            request(Method::DELETE, &format!("/api/snippets/{id}"), Some(ALICE_TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(
            &app,
            request(Method::GET, &format!("/api/snippets/{id}"), Some(ALICE_TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_ids_are_not_found() {
        let app = build_router(harness().state);
        let (_, body) = send(
            &app,
            request(
                Method::POST,
                "/api/collections",
                Some(ALICE_TOKEN),
                Some(json!({ "name": "Private" })),
            ),
        )
        .await;
        let id = body["collection"]["id"].as_str().unwrap().to_string();

        for (method, uri) in [
            (Method::GET, format!("/api/collections/{id}")),
            (Method::DELETE, format!("/api/collections/{id}")),
            (Method::GET, format!("/api/collections/{id}/snippets")),
            (Method::GET, "/api/collections/not-a-uuid".to_string()),
        ] {
            let (status, body) = send(&app, request(method, &uri, Some(BOB_TOKEN), None)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"], "Collection not found");
        }

        let (status, body) = send(
            &app,
            request(Method::GET, &format!("/api/collections/{id}"), Some(ALICE_TOKEN), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collection"]["name"], "Private");
    }

    #[tokio::test]
    async fn test_validation_errors_use_error_body() {
        let app = build_router(harness().state);
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/api/snippets",
                Some(ALICE_TOKEN),
                Some(json!({ "type": "poem", "content": "x" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/tags")
            .header(header::AUTHORIZATION, format!("Bearer {ALICE_TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_image_upload_multipart() {
        let app = build_router(harness().state);
        let boundary = "stashitboundary";
        let mut payload = Vec::new();
        payload.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"shot.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        payload.extend_from_slice(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
        payload.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/images/upload")
            .header(header::AUTHORIZATION, format!("Bearer {ALICE_TOKEN}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["image"]["fileSizeBytes"], 16);

        let (status, body) = send(&app, request(Method::GET, "/api/images", Some(ALICE_TOKEN), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["count"], 1);
        assert_eq!(body["stats"]["totalBytes"], 16);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = build_router(harness().state);
        let (status, body) = send(&app, request(Method::GET, "/api/nope", Some(ALICE_TOKEN), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }
}
