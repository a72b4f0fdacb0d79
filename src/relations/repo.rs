use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::RelationKind;
use crate::users::repo_types::User;

#[async_trait]
pub trait RelationRepo: Send + Sync {
    async fn exists(&self, kind: RelationKind, user_id: i64, target_id: i64)
        -> anyhow::Result<bool>;
    /// Returns `false` when the row was already present.
    async fn insert(&self, kind: RelationKind, user_id: i64, target_id: i64)
        -> anyhow::Result<bool>;
    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, kind: RelationKind, user_id: i64, target_id: i64)
        -> anyhow::Result<bool>;
    /// Authors `user_id` is subscribed to, ordered by username, plus the total.
    async fn subscribed_authors(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<User>, i64)>;
}

pub struct PgRelationRepo {
    db: PgPool,
}

impl PgRelationRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RelationRepo for PgRelationRepo {
    async fn exists(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND {} = $2)",
            kind.table(),
            kind.target_column()
        ))
        .bind(user_id)
        .bind(target_id)
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("check {}", kind.table()))?;
        Ok(exists)
    }

    async fn insert(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        // The unique constraint decides; a concurrent duplicate inserts nothing.
        let res = sqlx::query(&format!(
            "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            kind.table(),
            kind.target_column()
        ))
        .bind(user_id)
        .bind(target_id)
        .execute(&self.db)
        .await
        .with_context(|| format!("insert into {}", kind.table()))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
            kind.table(),
            kind.target_column()
        ))
        .bind(user_id)
        .bind(target_id)
        .execute(&self.db)
        .await
        .with_context(|| format!("delete from {}", kind.table()))?;
        Ok(res.rows_affected() > 0)
    }

    async fn subscribed_authors(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<User>, i64)> {
        let authors = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                   u.password_hash, u.created_at
              FROM users u
              JOIN subscriptions s ON s.author_id = u.id
             WHERE s.user_id = $1
             ORDER BY u.username
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list subscribed authors")?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await
                .context("count subscriptions")?;

        Ok((authors, count))
    }
}
