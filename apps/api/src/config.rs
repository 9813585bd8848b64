use anyhow::{bail, Context, Result};

use crate::images::ImagePolicy;

/// Where entities are persisted.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    /// In-process tables; contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    /// Base URL objects are served from. Defaults to `<endpoint>/<bucket>`.
    pub public_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Where image binaries are kept.
#[derive(Debug, Clone)]
pub enum ObjectStoreConfig {
    S3(S3Config),
    Memory,
}

/// Session seeded into the memory backend so the API is usable without an
/// identity provider.
#[derive(Debug, Clone)]
pub struct DevSession {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a variable required by the chosen backends is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub object_store: ObjectStoreConfig,
    pub images: ImagePolicy,
    pub session_cookie: String,
    pub cors_origins: Vec<String>,
    pub dev_session: Option<DevSession>,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::Memory,
            object_store: ObjectStoreConfig::Memory,
            images: ImagePolicy::default(),
            session_cookie: "better-auth.session_token".to_string(),
            cors_origins: vec!["http://localhost:5173".to_string()],
            dev_session: None,
            port: 3000,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let defaults = Config::default();

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StorageConfig::Postgres {
                database_url: require("DATABASE_URL")?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), 10)?,
            },
            "memory" => StorageConfig::Memory,
            other => bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let object_store = match get("OBJECT_STORE").as_deref().unwrap_or("s3") {
            "s3" => {
                let bucket = require("S3_BUCKET")?;
                let endpoint = require("S3_ENDPOINT")?;
                let public_url = get("S3_PUBLIC_URL")
                    .unwrap_or_else(|| format!("{}/{bucket}", endpoint.trim_end_matches('/')));
                ObjectStoreConfig::S3(S3Config {
                    region: get("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    access_key_id: require("AWS_ACCESS_KEY_ID")?,
                    secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
                    bucket,
                    endpoint,
                    public_url,
                })
            }
            "memory" => ObjectStoreConfig::Memory,
            other => bail!("OBJECT_STORE must be 's3' or 'memory', got '{other}'"),
        };

        let images = ImagePolicy {
            max_bytes: parse_or("IMAGE_MAX_BYTES", get("IMAGE_MAX_BYTES"), defaults.images.max_bytes)?,
            folder_prefix: get("IMAGE_FOLDER_PREFIX").unwrap_or(defaults.images.folder_prefix),
            ..defaults.images
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.cors_origins,
        };

        let dev_session = get("DEV_SESSION_TOKEN").map(|token| DevSession {
            token,
            user_id: get("DEV_USER_ID").unwrap_or_else(|| "dev-user".to_string()),
            email: get("DEV_USER_EMAIL").unwrap_or_else(|| "dev@localhost".to_string()),
        });

        Ok(Config {
            storage,
            object_store,
            images,
            session_cookie: get("SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            cors_origins,
            dev_session,
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            rust_log: get("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .ok()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
