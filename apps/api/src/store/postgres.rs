use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::auth::IdentityProvider;
use crate::errors::AppError;
use crate::guard::{self, Entity};
use crate::models::collection::{Collection, CollectionPatch, CollectionWithCount};
use crate::models::image::Image;
use crate::models::now;
use crate::models::snippet::{encode_metadata, Snippet, SnippetPatch, SnippetQuery, SnippetRow};
use crate::models::tag::{Tag, TagRef, TagWithCount};
use crate::models::user::Identity;
use crate::store::{
    duplicate_collection_link, duplicate_tag_link, duplicate_tag_name, image_cap_error, Store,
};

const SNIPPET_COLUMNS: &str = "id, owner_id, kind, content, metadata, created_at, updated_at";
const TAG_COLUMNS: &str = "id, owner_id, name, created_at";
const COLLECTION_COLUMNS: &str = "id, owner_id, name, description, created_at, updated_at";
const IMAGE_COLUMNS: &str =
    "id, owner_id, snippet_id, external_file_id, external_url, file_size_bytes, created_at";

/// PostgreSQL implementation of `Store`. All owners share one schema keyed by `owner_id`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_snippets(rows: Vec<SnippetRow>) -> Result<Vec<Snippet>, AppError> {
    rows.into_iter().map(Snippet::try_from).collect()
}

/// Escapes LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Store for PgStore {
    async fn insert_snippet(&self, snippet: &Snippet) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO snippets (id, owner_id, kind, content, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snippet.id)
        .bind(&snippet.owner_id)
        .bind(snippet.kind.as_str())
        .bind(&snippet.content)
        .bind(encode_metadata(snippet.metadata.as_ref())?)
        .bind(snippet.created_at)
        .bind(snippet.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn snippet(&self, owner: &str, id: Uuid) -> Result<Snippet, AppError> {
        let mut conn = self.pool.acquire().await?;
        let row: SnippetRow =
            guard::fetch_owned(&mut conn, Entity::Snippet, SNIPPET_COLUMNS, owner, id).await?;
        Snippet::try_from(row)
    }

    async fn snippets(&self, owner: &str, query: &SnippetQuery) -> Result<Vec<Snippet>, AppError> {
        let rows = sqlx::query_as::<_, SnippetRow>(
            r#"
            SELECT id, owner_id, kind, content, metadata, created_at, updated_at
            FROM snippets
            WHERE owner_id = $1
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::text IS NULL OR content ILIKE '%' || $3 || '%' ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner)
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.text.as_deref().map(escape_like))
        .fetch_all(&self.pool)
        .await?;
        into_snippets(rows)
    }

    async fn update_snippet(
        &self,
        owner: &str,
        id: Uuid,
        patch: &SnippetPatch,
    ) -> Result<Snippet, AppError> {
        let mut tx = self.pool.begin().await?;
        let row: SnippetRow =
            guard::fetch_owned(&mut tx, Entity::Snippet, SNIPPET_COLUMNS, owner, id).await?;
        let mut snippet = Snippet::try_from(row)?;
        patch.apply(&mut snippet, now());

        sqlx::query(
            "UPDATE snippets SET kind = $1, content = $2, metadata = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(snippet.kind.as_str())
        .bind(&snippet.content)
        .bind(encode_metadata(snippet.metadata.as_ref())?)
        .bind(snippet.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(snippet)
    }

    async fn delete_snippet(&self, owner: &str, id: Uuid) -> Result<Vec<Image>, AppError> {
        let mut tx = self.pool.begin().await?;
        guard::lock_owned(&mut tx, Entity::Snippet, owner, id).await?;

        let images = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE snippet_id = $1"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        // snippet_tags, snippet_collections and images go with it (ON DELETE CASCADE)
        sqlx::query("DELETE FROM snippets WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Deleted snippet {id} with {} attached images", images.len());
        Ok(images)
    }

    async fn insert_tag(&self, tag: &Tag) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO tags (id, owner_id, name, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(tag.id)
        .bind(&tag.owner_id)
        .bind(&tag.name)
        .bind(tag.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(duplicate_tag_name());
        }
        Ok(())
    }

    async fn tag(&self, owner: &str, id: Uuid) -> Result<Tag, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::fetch_owned(&mut conn, Entity::Tag, TAG_COLUMNS, owner, id).await
    }

    async fn tags(&self, owner: &str) -> Result<Vec<TagWithCount>, AppError> {
        Ok(sqlx::query_as::<_, TagWithCount>(
            r#"
            SELECT t.id, t.owner_id, t.name, t.created_at, COUNT(st.snippet_id) AS snippet_count
            FROM tags t
            LEFT JOIN snippet_tags st ON st.tag_id = t.id
            WHERE t.owner_id = $1
            GROUP BY t.id
            ORDER BY t.name COLLATE "C" ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_tag(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Tag, owner, id).await?;
        sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn tagged_snippets(&self, owner: &str, tag_id: Uuid) -> Result<Vec<Snippet>, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::require_owned(&mut conn, Entity::Tag, owner, tag_id).await?;
        let rows = sqlx::query_as::<_, SnippetRow>(
            r#"
            SELECT s.id, s.owner_id, s.kind, s.content, s.metadata, s.created_at, s.updated_at
            FROM snippets s
            JOIN snippet_tags st ON st.snippet_id = s.id
            WHERE st.tag_id = $1 AND s.owner_id = $2
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(tag_id)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await?;
        into_snippets(rows)
    }

    async fn link_tag(&self, owner: &str, snippet_id: Uuid, tag: &TagRef) -> Result<Tag, AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Snippet, owner, snippet_id).await?;

        let tag: Tag = match tag {
            TagRef::Id(tag_id) => {
                guard::fetch_owned(&mut tx, Entity::Tag, TAG_COLUMNS, owner, *tag_id).await?
            }
            TagRef::Name(name) => {
                sqlx::query(
                    "INSERT INTO tags (id, owner_id, name, created_at) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
                )
                .bind(Uuid::now_v7())
                .bind(owner)
                .bind(name)
                .bind(now())
                .execute(&mut *tx)
                .await?;

                sqlx::query_as::<_, Tag>(&format!(
                    "SELECT {TAG_COLUMNS} FROM tags WHERE owner_id = $1 AND lower(btrim(name)) = lower(btrim($2))"
                ))
                .bind(owner)
                .bind(name)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let linked = sqlx::query(
            "INSERT INTO snippet_tags (snippet_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(snippet_id)
        .bind(tag.id)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() == 0 {
            return Err(duplicate_tag_link());
        }

        tx.commit().await?;
        Ok(tag)
    }

    async fn snippet_tags(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Tag>, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::require_owned(&mut conn, Entity::Snippet, owner, snippet_id).await?;
        Ok(sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.owner_id, t.name, t.created_at
            FROM tags t
            JOIN snippet_tags st ON st.tag_id = t.id
            WHERE st.snippet_id = $1
            ORDER BY t.name COLLATE "C" ASC
            "#,
        )
        .bind(snippet_id)
        .fetch_all(&mut *conn)
        .await?)
    }

    async fn unlink_tag(&self, owner: &str, snippet_id: Uuid, tag_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Snippet, owner, snippet_id).await?;
        sqlx::query("DELETE FROM snippet_tags WHERE snippet_id = $1 AND tag_id = $2")
            .bind(snippet_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO collections (id, owner_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(collection.id)
        .bind(&collection.owner_id)
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(collection.created_at)
        .bind(collection.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn collection(&self, owner: &str, id: Uuid) -> Result<Collection, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::fetch_owned(&mut conn, Entity::Collection, COLLECTION_COLUMNS, owner, id).await
    }

    async fn collections(&self, owner: &str) -> Result<Vec<CollectionWithCount>, AppError> {
        Ok(sqlx::query_as::<_, CollectionWithCount>(
            r#"
            SELECT c.id, c.owner_id, c.name, c.description, c.created_at, c.updated_at,
                   COUNT(sc.snippet_id) AS snippet_count
            FROM collections c
            LEFT JOIN snippet_collections sc ON sc.collection_id = c.id
            WHERE c.owner_id = $1
            GROUP BY c.id
            ORDER BY c.created_at DESC, c.id DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_collection(
        &self,
        owner: &str,
        id: Uuid,
        patch: &CollectionPatch,
    ) -> Result<Collection, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut collection: Collection =
            guard::fetch_owned(&mut tx, Entity::Collection, COLLECTION_COLUMNS, owner, id).await?;
        patch.apply(&mut collection, now());

        sqlx::query(
            "UPDATE collections SET name = $1, description = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(collection.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(collection)
    }

    async fn delete_collection(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Collection, owner, id).await?;
        sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn link_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Collection, owner, collection_id).await?;
        guard::require_owned(&mut tx, Entity::Snippet, owner, snippet_id).await?;

        let linked = sqlx::query(
            "INSERT INTO snippet_collections (snippet_id, collection_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(snippet_id)
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() == 0 {
            return Err(duplicate_collection_link());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn collection_snippets(
        &self,
        owner: &str,
        collection_id: Uuid,
    ) -> Result<Vec<Snippet>, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::require_owned(&mut conn, Entity::Collection, owner, collection_id).await?;
        let rows = sqlx::query_as::<_, SnippetRow>(
            r#"
            SELECT s.id, s.owner_id, s.kind, s.content, s.metadata, s.created_at, s.updated_at
            FROM snippets s
            JOIN snippet_collections sc ON sc.snippet_id = s.id
            WHERE sc.collection_id = $1 AND s.owner_id = $2
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(collection_id)
        .bind(owner)
        .fetch_all(&mut *conn)
        .await?;
        into_snippets(rows)
    }

    async fn unlink_collection(
        &self,
        owner: &str,
        collection_id: Uuid,
        snippet_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Collection, owner, collection_id).await?;
        sqlx::query("DELETE FROM snippet_collections WHERE collection_id = $1 AND snippet_id = $2")
            .bind(collection_id)
            .bind(snippet_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn snippet_image_count(&self, owner: &str, snippet_id: Uuid) -> Result<usize, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::require_owned(&mut conn, Entity::Snippet, owner, snippet_id).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE snippet_id = $1")
            .bind(snippet_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count as usize)
    }

    async fn insert_image(&self, image: &Image, max_per_snippet: usize) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(snippet_id) = image.snippet_id {
            // Row lock on the snippet serializes concurrent uploads against the cap.
            guard::lock_owned(&mut tx, Entity::Snippet, &image.owner_id, snippet_id).await?;
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE snippet_id = $1")
                    .bind(snippet_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if count as usize >= max_per_snippet {
                return Err(image_cap_error(max_per_snippet));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO images
                (id, owner_id, snippet_id, external_file_id, external_url, file_size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(image.id)
        .bind(&image.owner_id)
        .bind(image.snippet_id)
        .bind(&image.external_file_id)
        .bind(&image.external_url)
        .bind(image.file_size_bytes)
        .bind(image.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn image(&self, owner: &str, id: Uuid) -> Result<Image, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::fetch_owned(&mut conn, Entity::Image, IMAGE_COLUMNS, owner, id).await
    }

    async fn images(&self, owner: &str) -> Result<Vec<Image>, AppError> {
        Ok(sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn snippet_images(&self, owner: &str, snippet_id: Uuid) -> Result<Vec<Image>, AppError> {
        let mut conn = self.pool.acquire().await?;
        guard::require_owned(&mut conn, Entity::Snippet, owner, snippet_id).await?;
        Ok(sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE snippet_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(snippet_id)
        .fetch_all(&mut *conn)
        .await?)
    }

    async fn delete_image(&self, owner: &str, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        guard::require_owned(&mut tx, Entity::Image, owner, id).await?;
        sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for PgStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, AppError> {
        Ok(sqlx::query_as::<_, Identity>(
            r#"
            SELECT u.id, u.email, u.name, u.email_verified
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.expires_at > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }
}
