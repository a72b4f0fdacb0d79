use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, QueryBuilder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

#[async_trait]
pub trait IngredientRepo: Send + Sync {
    /// All ingredients ordered by name, optionally restricted to names
    /// starting with `prefix` (case-insensitive).
    async fn search(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ingredient>>;
    async fn find(&self, id: i64) -> anyhow::Result<Option<Ingredient>>;
    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Ingredient>>;
    /// Returns the number of inserted rows.
    async fn insert_many(&self, rows: &[NewIngredient]) -> anyhow::Result<u64>;
}

pub struct PgIngredientRepo {
    db: PgPool,
}

impl PgIngredientRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// Keeps a single statement well under the postgres bind parameter limit.
const INSERT_CHUNK: usize = 1000;

#[async_trait]
impl IngredientRepo for PgIngredientRepo {
    async fn search(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ingredient>> {
        let rows = match prefix {
            Some(prefix) => {
                sqlx::query_as::<_, Ingredient>(
                    r#"
                    SELECT id, name, measurement_unit
                      FROM ingredients
                     WHERE starts_with(lower(name), lower($1))
                     ORDER BY name
                    "#,
                )
                .bind(prefix)
                .fetch_all(&self.db)
                .await
            }
            None => {
                sqlx::query_as::<_, Ingredient>(
                    "SELECT id, name, measurement_unit FROM ingredients ORDER BY name",
                )
                .fetch_all(&self.db)
                .await
            }
        }
        .context("search ingredients")?;
        Ok(rows)
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Ingredient>> {
        let row = sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find ingredient")?;
        Ok(row)
    }

    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, measurement_unit FROM ingredients WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("find ingredients by ids")?;
        Ok(rows)
    }

    async fn insert_many(&self, rows: &[NewIngredient]) -> anyhow::Result<u64> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb = QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.name).push_bind(&row.measurement_unit);
            });
            inserted += qb
                .build()
                .execute(&mut *tx)
                .await
                .context("insert ingredients")?
                .rows_affected();
        }
        tx.commit().await.context("commit tx")?;
        Ok(inserted)
    }
}
