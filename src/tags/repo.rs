use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String, // hex, e.g. "#FF0000"
    pub slug: String,
}

#[async_trait]
pub trait TagRepo: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Tag>>;
    async fn find(&self, id: i64) -> anyhow::Result<Option<Tag>>;
    /// Tags matching `ids`; unknown ids are simply absent from the result.
    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Tag>>;
}

pub struct PgTagRepo {
    db: PgPool,
}

impl PgTagRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TagRepo for PgTagRepo {
    async fn list(&self) -> anyhow::Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags ORDER BY name")
            .fetch_all(&self.db)
            .await
            .context("list tags")?;
        Ok(tags)
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name, color, slug FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find tag")?;
        Ok(tag)
    }

    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, color, slug FROM tags WHERE id = ANY($1) ORDER BY name",
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("find tags by ids")?;
        Ok(tags)
    }
}
