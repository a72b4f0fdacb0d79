use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::repo_types::{CartLine, Recipe, RecipeDraft, RecipeFilter, RecipeIngredient};
use crate::tags::repo::Tag;

#[async_trait]
pub trait RecipeRepo: Send + Sync {
    /// One page of recipes, newest first, plus the total matching count.
    async fn list(&self, filter: &RecipeFilter) -> anyhow::Result<(Vec<Recipe>, i64)>;
    async fn find(&self, id: i64) -> anyhow::Result<Option<Recipe>>;
    async fn tags(&self, recipe_id: i64) -> anyhow::Result<Vec<Tag>>;
    async fn ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<RecipeIngredient>>;
    /// Inserts the recipe with its tags and amount entries atomically.
    async fn create(&self, author_id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe>;
    /// Rewrites the recipe row and replaces its tag set and amount entries
    /// atomically. Old amount entries are deleted, never merged.
    async fn update(&self, id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe>;
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
    async fn by_author(&self, author_id: i64, limit: Option<i64>) -> anyhow::Result<Vec<Recipe>>;
    async fn count_by_author(&self, author_id: i64) -> anyhow::Result<i64>;
    /// Every amount entry of every recipe in the user's cart.
    async fn cart_lines(&self, user_id: i64) -> anyhow::Result<Vec<CartLine>>;
}

pub struct PgRecipeRepo {
    db: PgPool,
}

impl PgRecipeRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const RECIPE_COLUMNS: &str = "r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, r.pub_date";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &RecipeFilter) {
    qb.push(" WHERE TRUE");
    if let Some(author_id) = f.author_id {
        qb.push(" AND r.author_id = ").push_bind(author_id);
    }
    if !f.tag_slugs.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id \
             WHERE rt.recipe_id = r.id AND t.slug = ANY(",
        )
        .push_bind(f.tag_slugs.clone())
        .push("))");
    }
    if let Some(user_id) = f.favorited_by {
        qb.push(" AND EXISTS (SELECT 1 FROM favorites fv WHERE fv.recipe_id = r.id AND fv.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
    if let Some(user_id) = f.in_cart_of {
        qb.push(" AND EXISTS (SELECT 1 FROM cart_entries ce WHERE ce.recipe_id = r.id AND ce.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
}

async fn write_relations(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    draft: &RecipeDraft,
) -> anyhow::Result<()> {
    if !draft.tag_ids.is_empty() {
        let mut qb = QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
        qb.push_values(&draft.tag_ids, |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });
        qb.build()
            .execute(&mut **tx)
            .await
            .context("insert recipe tags")?;
    }

    if !draft.ingredients.is_empty() {
        let mut qb = QueryBuilder::new(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
        );
        qb.push_values(&draft.ingredients, |mut b, entry| {
            b.push_bind(recipe_id)
                .push_bind(entry.ingredient_id)
                .push_bind(entry.amount);
        });
        qb.build()
            .execute(&mut **tx)
            .await
            .context("insert recipe ingredients")?;
    }
    Ok(())
}

#[async_trait]
impl RecipeRepo for PgRecipeRepo {
    async fn list(&self, filter: &RecipeFilter) -> anyhow::Result<(Vec<Recipe>, i64)> {
        let mut qb = QueryBuilder::new(format!("SELECT {RECIPE_COLUMNS} FROM recipes r"));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let recipes = qb
            .build_query_as::<Recipe>()
            .fetch_all(&self.db)
            .await
            .context("list recipes")?;

        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
        push_filters(&mut qb, filter);
        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.db)
            .await
            .context("count recipes")?;

        Ok((recipes, count))
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Recipe>> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find recipe")?;
        Ok(recipe)
    }

    async fn tags(&self, recipe_id: i64) -> anyhow::Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name, t.color, t.slug
              FROM tags t
              JOIN recipe_tags rt ON rt.tag_id = t.id
             WHERE rt.recipe_id = $1
             ORDER BY t.name
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.db)
        .await
        .context("recipe tags")?;
        Ok(tags)
    }

    async fn ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<RecipeIngredient>> {
        let rows = sqlx::query_as::<_, RecipeIngredient>(
            r#"
            SELECT i.id, i.name, i.measurement_unit, ri.amount
              FROM recipe_ingredients ri
              JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ri.recipe_id = $1
             ORDER BY i.name
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.db)
        .await
        .context("recipe ingredients")?;
        Ok(rows)
    }

    async fn create(&self, author_id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let recipe = sqlx::query_as::<_, Recipe>(
            r#"
            INSERT INTO recipes (author_id, name, image, text, cooking_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, author_id, name, image, text, cooking_time, pub_date
            "#,
        )
        .bind(author_id)
        .bind(&draft.name)
        .bind(&draft.image)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .fetch_one(&mut *tx)
        .await
        .context("insert recipe")?;

        write_relations(&mut tx, recipe.id, draft).await?;
        tx.commit().await.context("commit tx")?;
        Ok(recipe)
    }

    async fn update(&self, id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let recipe = sqlx::query_as::<_, Recipe>(
            r#"
            UPDATE recipes
               SET name = $2, image = COALESCE($3, image), text = $4, cooking_time = $5
             WHERE id = $1
            RETURNING id, author_id, name, image, text, cooking_time, pub_date
            "#,
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.image)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .fetch_one(&mut *tx)
        .await
        .context("update recipe")?;

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("clear recipe tags")?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("clear recipe ingredients")?;

        write_relations(&mut tx, id, draft).await?;
        tx.commit().await.context("commit tx")?;
        Ok(recipe)
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete recipe")?;
        Ok(res.rows_affected() > 0)
    }

    async fn by_author(&self, author_id: i64, limit: Option<i64>) -> anyhow::Result<Vec<Recipe>> {
        // LIMIT NULL means no limit in postgres
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.author_id = $1 \
             ORDER BY r.pub_date DESC, r.id DESC LIMIT $2"
        ))
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("recipes by author")?;
        Ok(recipes)
    }

    async fn count_by_author(&self, author_id: i64) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.db)
            .await
            .context("count recipes by author")?;
        Ok(count)
    }

    async fn cart_lines(&self, user_id: i64) -> anyhow::Result<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT i.name, i.measurement_unit, ri.amount
              FROM cart_entries ce
              JOIN recipe_ingredients ri ON ri.recipe_id = ce.recipe_id
              JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ce.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("cart lines")?;
        Ok(rows)
    }
}
