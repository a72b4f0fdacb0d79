//! In-memory repositories and object storage for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use lazy_static::lazy_static;
use time::OffsetDateTime;
use tower::ServiceExt;

use crate::{
    auth::{jwt::JwtKeys, password::hash_password},
    ingredients::repo::{Ingredient, IngredientRepo, NewIngredient},
    recipes::{
        repo::RecipeRepo,
        repo_types::{AmountEntry, CartLine, Recipe, RecipeDraft, RecipeFilter, RecipeIngredient},
    },
    relations::{repo::RelationRepo, RelationKind},
    state::AppState,
    storage::StorageClient,
    tags::repo::{Tag, TagRepo},
    users::{
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
};

pub const PASSWORD: &str = "correct-horse";

lazy_static! {
    // Argon2 is slow in debug builds; hash once per test binary.
    static ref PASSWORD_HASH: String = hash_password(PASSWORD).unwrap();
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tags: Vec<Tag>,
    ingredients: Vec<Ingredient>,
    recipes: Vec<Recipe>,
    recipe_tags: Vec<(i64, i64)>,
    recipe_ingredients: Vec<(i64, AmountEntry)>,
    relations: HashSet<(RelationKind, i64, i64)>,
    next_id: HashMap<&'static str, i64>,
}

impl Tables {
    fn id(&mut self, table: &'static str) -> i64 {
        let next = self.next_id.entry(table).or_insert(0);
        *next += 1;
        *next
    }

    fn recipe_tags(&self, recipe_id: i64) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .recipe_tags
            .iter()
            .filter(|(r, _)| *r == recipe_id)
            .filter_map(|(_, t)| self.tags.iter().find(|tag| tag.id == *t).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    fn write_relations(&mut self, recipe_id: i64, draft: &RecipeDraft) {
        self.recipe_tags.retain(|(r, _)| *r != recipe_id);
        self.recipe_ingredients.retain(|(r, _)| *r != recipe_id);
        self.recipe_tags
            .extend(draft.tag_ids.iter().map(|t| (recipe_id, *t)));
        self.recipe_ingredients
            .extend(draft.ingredients.iter().map(|e| (recipe_id, *e)));
    }

    fn matches(&self, recipe: &Recipe, f: &RecipeFilter) -> bool {
        if f.author_id.is_some_and(|a| a != recipe.author_id) {
            return false;
        }
        if !f.tag_slugs.is_empty()
            && !self
                .recipe_tags(recipe.id)
                .iter()
                .any(|t| f.tag_slugs.contains(&t.slug))
        {
            return false;
        }
        if let Some(user_id) = f.favorited_by {
            if !self
                .relations
                .contains(&(RelationKind::Favorite, user_id, recipe.id))
            {
                return false;
            }
        }
        if let Some(user_id) = f.in_cart_of {
            if !self
                .relations
                .contains(&(RelationKind::Cart, user_id, recipe.id))
            {
                return false;
            }
        }
        true
    }

    fn newest_first(recipes: &mut [Recipe]) {
        recipes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
    }
}

/// Every repository trait over one set of tables. Ids start at 1 per table.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    skip_exists: AtomicBool,
    hide_users: AtomicBool,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next `exists` call reports `false`, as if another request
    /// inserted the row right after the check.
    pub fn fail_next_exists_check(&self) {
        self.skip_exists.store(true, Ordering::SeqCst);
    }

    /// Email and username lookups report nothing until the next user
    /// insert, as if a concurrent registration had not committed yet.
    pub fn hide_users_until_next_insert(&self) {
        self.hide_users.store(true, Ordering::SeqCst);
    }

    fn users_hidden(&self) -> bool {
        self.hide_users.load(Ordering::SeqCst)
    }

    pub fn insert_tag(&self, name: &str, color: &str, slug: &str) -> Tag {
        let mut t = self.lock();
        let tag = Tag {
            id: t.id("tags"),
            name: name.into(),
            color: color.into(),
            slug: slug.into(),
        };
        t.tags.push(tag.clone());
        tag
    }

    pub fn recipe_count(&self) -> usize {
        self.lock().recipes.len()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        if self.users_hidden() {
            return Ok(None);
        }
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        if self.users_hidden() {
            return Ok(None);
        }
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create(&self, user: &NewUser) -> anyhow::Result<Option<User>> {
        self.hide_users.store(false, Ordering::SeqCst);
        let mut t = self.lock();
        if t.users
            .iter()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Ok(None);
        }
        let created = User {
            id: t.id("users"),
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            password_hash: user.password_hash.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(created.clone());
        Ok(Some(created))
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<User>, i64)> {
        let t = self.lock();
        let mut users = t.users.clone();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        let count = users.len() as i64;
        Ok((page(users, limit, offset), count))
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> anyhow::Result<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl TagRepo for MemoryStore {
    async fn list(&self) -> anyhow::Result<Vec<Tag>> {
        let mut tags = self.lock().tags.clone();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Tag>> {
        Ok(self.lock().tags.iter().find(|t| t.id == id).cloned())
    }

    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .lock()
            .tags
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}

#[async_trait]
impl IngredientRepo for MemoryStore {
    async fn search(&self, prefix: Option<&str>) -> anyhow::Result<Vec<Ingredient>> {
        let prefix = prefix.map(str::to_lowercase);
        let mut rows: Vec<Ingredient> = self
            .lock()
            .ingredients
            .iter()
            .filter(|i| {
                prefix
                    .as_deref()
                    .map_or(true, |p| i.name.to_lowercase().starts_with(p))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Ingredient>> {
        Ok(self.lock().ingredients.iter().find(|i| i.id == id).cloned())
    }

    async fn find_many(&self, ids: &[i64]) -> anyhow::Result<Vec<Ingredient>> {
        Ok(self
            .lock()
            .ingredients
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, rows: &[NewIngredient]) -> anyhow::Result<u64> {
        let mut t = self.lock();
        for row in rows {
            let id = t.id("ingredients");
            t.ingredients.push(Ingredient {
                id,
                name: row.name.clone(),
                measurement_unit: row.measurement_unit.clone(),
            });
        }
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl RecipeRepo for MemoryStore {
    async fn list(&self, filter: &RecipeFilter) -> anyhow::Result<(Vec<Recipe>, i64)> {
        let t = self.lock();
        let mut recipes: Vec<Recipe> = t
            .recipes
            .iter()
            .filter(|r| t.matches(r, filter))
            .cloned()
            .collect();
        Tables::newest_first(&mut recipes);
        let count = recipes.len() as i64;
        Ok((page(recipes, filter.limit, filter.offset), count))
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Recipe>> {
        Ok(self.lock().recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn tags(&self, recipe_id: i64) -> anyhow::Result<Vec<Tag>> {
        Ok(self.lock().recipe_tags(recipe_id))
    }

    async fn ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<RecipeIngredient>> {
        let t = self.lock();
        let mut rows: Vec<RecipeIngredient> = t
            .recipe_ingredients
            .iter()
            .filter(|(r, _)| *r == recipe_id)
            .filter_map(|(_, e)| {
                t.ingredients
                    .iter()
                    .find(|i| i.id == e.ingredient_id)
                    .map(|i| RecipeIngredient {
                        id: i.id,
                        name: i.name.clone(),
                        measurement_unit: i.measurement_unit.clone(),
                        amount: e.amount,
                    })
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn create(&self, author_id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe> {
        let mut t = self.lock();
        if !t.users.iter().any(|u| u.id == author_id) {
            anyhow::bail!("recipes.author_id violates foreign key");
        }
        let recipe = Recipe {
            id: t.id("recipes"),
            author_id,
            name: draft.name.clone(),
            image: draft.image.clone(),
            text: draft.text.clone(),
            cooking_time: draft.cooking_time,
            pub_date: OffsetDateTime::now_utc(),
        };
        t.recipes.push(recipe.clone());
        t.write_relations(recipe.id, draft);
        Ok(recipe)
    }

    async fn update(&self, id: i64, draft: &RecipeDraft) -> anyhow::Result<Recipe> {
        let mut t = self.lock();
        let Some(recipe) = t.recipes.iter_mut().find(|r| r.id == id) else {
            anyhow::bail!("recipe {id} not found");
        };
        recipe.name = draft.name.clone();
        if draft.image.is_some() {
            recipe.image = draft.image.clone();
        }
        recipe.text = draft.text.clone();
        recipe.cooking_time = draft.cooking_time;
        let updated = recipe.clone();
        t.write_relations(id, draft);
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let mut t = self.lock();
        let before = t.recipes.len();
        t.recipes.retain(|r| r.id != id);
        if t.recipes.len() == before {
            return Ok(false);
        }
        t.recipe_tags.retain(|(r, _)| *r != id);
        t.recipe_ingredients.retain(|(r, _)| *r != id);
        t.relations
            .retain(|(kind, _, target)| kind.target_column() != "recipe_id" || *target != id);
        Ok(true)
    }

    async fn by_author(&self, author_id: i64, limit: Option<i64>) -> anyhow::Result<Vec<Recipe>> {
        let mut recipes: Vec<Recipe> = self
            .lock()
            .recipes
            .iter()
            .filter(|r| r.author_id == author_id)
            .cloned()
            .collect();
        Tables::newest_first(&mut recipes);
        if let Some(limit) = limit {
            recipes.truncate(limit.max(0) as usize);
        }
        Ok(recipes)
    }

    async fn count_by_author(&self, author_id: i64) -> anyhow::Result<i64> {
        Ok(self
            .lock()
            .recipes
            .iter()
            .filter(|r| r.author_id == author_id)
            .count() as i64)
    }

    async fn cart_lines(&self, user_id: i64) -> anyhow::Result<Vec<CartLine>> {
        let t = self.lock();
        let mut lines = Vec::new();
        for (kind, owner, recipe_id) in &t.relations {
            if *kind != RelationKind::Cart || *owner != user_id {
                continue;
            }
            for (_, entry) in t.recipe_ingredients.iter().filter(|(r, _)| r == recipe_id) {
                if let Some(i) = t.ingredients.iter().find(|i| i.id == entry.ingredient_id) {
                    lines.push(CartLine {
                        name: i.name.clone(),
                        measurement_unit: i.measurement_unit.clone(),
                        amount: entry.amount,
                    });
                }
            }
        }
        Ok(lines)
    }
}

#[async_trait]
impl RelationRepo for MemoryStore {
    async fn exists(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        if self.skip_exists.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.lock().relations.contains(&(kind, user_id, target_id)))
    }

    async fn insert(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        Ok(self.lock().relations.insert((kind, user_id, target_id)))
    }

    async fn delete(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> anyhow::Result<bool> {
        Ok(self.lock().relations.remove(&(kind, user_id, target_id)))
    }

    async fn subscribed_authors(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<User>, i64)> {
        let t = self.lock();
        let mut authors: Vec<User> = t
            .users
            .iter()
            .filter(|u| {
                t.relations
                    .contains(&(RelationKind::Subscription, user_id, u.id))
            })
            .cloned()
            .collect();
        authors.sort_by(|a, b| a.username.cmp(&b.username));
        let count = authors.len() as i64;
        Ok((page(authors, limit, offset), count))
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl FakeStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("http://storage.test/{key}?expires={seconds}"))
    }
}

/// Fake state plus shortcuts for seeding rows and driving the router.
pub struct Fixture {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let state = AppState::fake_with(store.clone(), storage.clone());
        Self {
            state,
            store,
            storage,
        }
    }

    /// User `name` with email `name@example.com` and password [`PASSWORD`].
    pub async fn user(&self, name: &str) -> User {
        UserRepo::create(
            self.store.as_ref(),
            &NewUser {
                email: format!("{name}@example.com"),
                username: name.into(),
                first_name: name.into(),
                last_name: "Test".into(),
                password_hash: PASSWORD_HASH.clone(),
            },
        )
        .await
        .unwrap()
        .unwrap()
    }

    pub fn token(&self, user_id: i64) -> String {
        JwtKeys::from(&self.state.config.jwt)
            .sign_access(user_id)
            .unwrap()
    }

    pub async fn tag(&self, name: &str, slug: &str) -> Tag {
        self.store.insert_tag(name, "#49B64E", slug)
    }

    pub async fn ingredient(&self, name: &str, unit: &str) -> Ingredient {
        self.store
            .insert_many(&[NewIngredient {
                name: name.into(),
                measurement_unit: unit.into(),
            }])
            .await
            .unwrap();
        self.store
            .search(Some(name))
            .await
            .unwrap()
            .into_iter()
            .filter(|i| i.name == name && i.measurement_unit == unit)
            .last()
            .unwrap()
    }

    /// Recipe without tags or image, with the given `(ingredient_id, amount)` entries.
    pub async fn recipe(&self, author_id: i64, amounts: &[(i64, i32)]) -> Recipe {
        RecipeRepo::create(
            self.store.as_ref(),
            author_id,
            &RecipeDraft {
                name: "Recipe".into(),
                image: None,
                text: "Cook it.".into(),
                cooking_time: 10,
                tag_ids: Vec::new(),
                ingredients: amounts
                    .iter()
                    .map(|&(ingredient_id, amount)| AmountEntry {
                        ingredient_id,
                        amount,
                    })
                    .collect(),
            },
        )
        .await
        .unwrap()
    }

    pub fn app(&self) -> Router {
        crate::app::build_app(self.state.clone())
    }

    /// Sends one request through the full router.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Bytes) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = self.app().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes)
    }

    /// Like [`Fixture::call`] but parses the body as JSON (`Null` when empty).
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = self.call(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
