use anyhow::Context;
use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classify::DetectedFood;

/// Lifecycle of an uploaded meal photo. `Done` and `Failed` are terminal;
/// there is no retry path out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "image_status", rename_all = "lowercase")]
pub enum ImageStatus {
    Uploaded,
    Done,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_path: String,
    pub status: ImageStatus,
    pub detected_foods: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Register a freshly uploaded blob; the row starts in `Uploaded`.
    async fn insert_uploaded(&self, user_id: Uuid, storage_path: &str) -> anyhow::Result<Uuid>;
    async fn mark_done(&self, image_id: Uuid, foods: &[DetectedFood]) -> anyhow::Result<()>;
    async fn mark_failed(&self, image_id: Uuid) -> anyhow::Result<()>;
    async fn get_owned(&self, user_id: Uuid, image_id: Uuid)
        -> anyhow::Result<Option<ImageRecord>>;
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ImageRecord>>;
}

pub struct PgImageStore {
    db: PgPool,
}

impl PgImageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageStore for PgImageStore {
    async fn insert_uploaded(&self, user_id: Uuid, storage_path: &str) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO images (user_id, storage_path, status)
            VALUES ($1, $2, 'uploaded')
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(storage_path)
        .fetch_one(&self.db)
        .await
        .context("insert image")?;
        Ok(id)
    }

    async fn mark_done(&self, image_id: Uuid, foods: &[DetectedFood]) -> anyhow::Result<()> {
        let foods = serde_json::to_value(foods).context("serialize detected foods")?;
        sqlx::query(
            r#"
            UPDATE images
            SET status = 'done', detected_foods = $2
            WHERE id = $1
            "#,
        )
        .bind(image_id)
        .bind(foods)
        .execute(&self.db)
        .await
        .context("mark image done")?;
        Ok(())
    }

    async fn mark_failed(&self, image_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE images SET status = 'failed' WHERE id = $1"#)
            .bind(image_id)
            .execute(&self.db)
            .await
            .context("mark image failed")?;
        Ok(())
    }

    async fn get_owned(
        &self,
        user_id: Uuid,
        image_id: Uuid,
    ) -> anyhow::Result<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, user_id, storage_path, status, detected_foods, created_at
            FROM images
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(image_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get image")?;
        Ok(row)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ImageRecord>> {
        let rows = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, user_id, storage_path, status, detected_foods, created_at
            FROM images
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list images")?;
        Ok(rows)
    }
}
