//! Ownership guard. The one place that decides whether an identity may touch a row.
//!
//! RULE: every store operation that takes an entity id runs one of these checks
//! before reading or mutating anything else. A row that exists but belongs to
//! another owner is reported exactly like a missing row.

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::collection::Collection;
use crate::models::image::Image;
use crate::models::snippet::Snippet;
use crate::models::tag::Tag;

/// Owner-scoped entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Snippet,
    Tag,
    Collection,
    Image,
}

impl Entity {
    fn table(&self) -> &'static str {
        match self {
            Entity::Snippet => "snippets",
            Entity::Tag => "tags",
            Entity::Collection => "collections",
            Entity::Image => "images",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Entity::Snippet => "Snippet",
            Entity::Tag => "Tag",
            Entity::Collection => "Collection",
            Entity::Image => "Image",
        }
    }

    pub fn not_found(&self) -> AppError {
        AppError::NotFound(format!("{} not found", self.label()))
    }

    /// Parses a client-supplied id. A malformed id cannot name an owned row,
    /// so it is reported as not found.
    pub fn parse_id(&self, raw: &str) -> Result<Uuid, AppError> {
        Uuid::parse_str(raw.trim()).map_err(|_| self.not_found())
    }
}

/// Records that carry an owner.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for Snippet {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for Tag {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for Collection {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for Image {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// In-memory form: passes the row through only if `owner` owns it.
pub fn check<'a, T: Owned>(row: Option<&'a T>, entity: Entity, owner: &str) -> Result<&'a T, AppError> {
    match row {
        Some(row) if row.owner_id() == owner => Ok(row),
        _ => Err(entity.not_found()),
    }
}

/// PostgreSQL form. Run it on the operation's own transaction.
pub async fn require_owned(
    conn: &mut PgConnection,
    entity: Entity,
    owner: &str,
    id: Uuid,
) -> Result<(), AppError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE id = $1 AND owner_id = $2",
        entity.table()
    );
    owned_row(conn, &sql, entity, owner, id).await
}

/// Like [`require_owned`] but also takes a row lock until the transaction ends,
/// so concurrent writers keyed on this parent serialize.
pub async fn lock_owned(
    conn: &mut PgConnection,
    entity: Entity,
    owner: &str,
    id: Uuid,
) -> Result<(), AppError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        entity.table()
    );
    owned_row(conn, &sql, entity, owner, id).await
}

/// Guarded read: loads `columns` of the row only if `owner` owns it.
pub async fn fetch_owned<T>(
    conn: &mut PgConnection,
    entity: Entity,
    columns: &str,
    owner: &str,
    id: Uuid,
) -> Result<T, AppError>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT {columns} FROM {} WHERE id = $1 AND owner_id = $2",
        entity.table()
    );
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| entity.not_found())
}

async fn owned_row(
    conn: &mut PgConnection,
    sql: &str,
    entity: Entity,
    owner: &str,
    id: Uuid,
) -> Result<(), AppError> {
    let found: Option<i32> = sqlx::query_scalar(sql)
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
    found.map(|_| ()).ok_or_else(|| entity.not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tag(owner: &str) -> Tag {
        Tag {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            name: "rust".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_malformed_id_is_not_found() {
        let err = Entity::Snippet.parse_id("snip_123_abc").unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Snippet not found"));
        let id = Uuid::now_v7();
        assert_eq!(Entity::Snippet.parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_owner_passes() {
        let t = tag("alice");
        assert_eq!(check(Some(&t), Entity::Tag, "alice").unwrap().id, t.id);
    }

    #[test]
    fn test_other_owner_looks_missing() {
        let t = tag("alice");
        let foreign = check(Some(&t), Entity::Tag, "bob").unwrap_err();
        let missing = check::<Tag>(None, Entity::Tag, "bob").unwrap_err();
        assert_eq!(foreign.to_string(), missing.to_string());
        assert!(matches!(foreign, AppError::NotFound(ref m) if m == "Tag not found"));
    }
}
