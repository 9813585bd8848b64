mod auth;
mod collections;
mod config;
mod db;
mod errors;
mod guard;
mod images;
mod models;
mod object_store;
mod routes;
mod snippets;
mod state;
mod store;
mod tags;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::config::{Config, ObjectStoreConfig, S3Config, StorageConfig};
use crate::db::create_pool;
use crate::models::user::Identity;
use crate::object_store::{MemoryObjectStorage, ObjectStorage, S3ObjectStorage};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stash It API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize entity store and identity provider
    let (store, identity): (Arc<dyn Store>, Arc<dyn IdentityProvider>) = match &config.storage {
        StorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = create_pool(database_url, *max_connections).await?;
            let store = Arc::new(PgStore::new(pool));
            (store.clone() as Arc<dyn Store>, store as Arc<dyn IdentityProvider>)
        }
        StorageConfig::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            let mut store = MemoryStore::new();
            if let Some(dev) = &config.dev_session {
                info!("Seeding dev session for user {}", dev.user_id);
                store = store.with_session(
                    &dev.token,
                    Identity {
                        id: dev.user_id.clone(),
                        email: dev.email.clone(),
                        name: None,
                        email_verified: true,
                    },
                    chrono::DateTime::<chrono::Utc>::MAX_UTC,
                );
            }
            let store = Arc::new(store);
            (store.clone() as Arc<dyn Store>, store as Arc<dyn IdentityProvider>)
        }
    };

    // Initialize object storage
    let objects: Arc<dyn ObjectStorage> = match &config.object_store {
        ObjectStoreConfig::S3(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 client initialized (bucket: {})", s3.bucket);
            Arc::new(S3ObjectStorage::new(
                client,
                s3.bucket.clone(),
                s3.public_url.clone(),
            ))
        }
        ObjectStoreConfig::Memory => {
            warn!("Using in-memory object storage; images are lost on restart");
            Arc::new(MemoryObjectStorage::new())
        }
    };

    // Build app state
    let state = AppState::new(store, identity, objects, config.clone());

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config.cors_origins));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "stashit-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .load()
        .await;

    // Path-style addressing for MinIO and other S3-compatible endpoints
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Credentialed CORS for the browser client's origins. Unparseable origins are skipped.
fn build_cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{o}'");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}
