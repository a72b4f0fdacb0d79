use lazy_static::lazy_static;
use regex::Regex;

use super::{
    dto::{RegisterRequest, SubscriptionResponse, UserResponse},
    repo_types::User,
};
use crate::{
    auth::password::check_new_password,
    error::ApiError,
    recipes::services::recipe_summary,
    relations::RelationKind,
    state::AppState,
};

pub const MAX_NAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;

/// Usernames that would shadow fixed routes under `/users/`.
const RESERVED_USERNAMES: &[&str] = &["me"];

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    }
    if username.is_empty() || username.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "Username must be 1 to {MAX_NAME_LEN} characters."
        )));
    }
    if RESERVED_USERNAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(username))
    {
        return Err(ApiError::validation(format!(
            "Username '{username}' is reserved."
        )));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::validation(
            "Username may contain only letters, digits and @/./+/-/_ characters.",
        ));
    }
    Ok(())
}

/// Normalizes the email in place and checks every field.
pub fn validate_registration(req: &mut RegisterRequest) -> Result<(), ApiError> {
    req.email = req.email.trim().to_lowercase();
    req.username = req.username.trim().to_string();

    if !is_valid_email(&req.email) {
        return Err(ApiError::validation("Enter a valid email address."));
    }
    validate_username(&req.username)?;
    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        if value.trim().is_empty() || value.chars().count() > MAX_NAME_LEN {
            return Err(ApiError::validation(format!(
                "{field} must be 1 to {MAX_NAME_LEN} characters."
            )));
        }
    }
    check_new_password(&req.password)
}

pub async fn user_response(
    st: &AppState,
    user: &User,
    viewer: Option<i64>,
) -> Result<UserResponse, ApiError> {
    let is_subscribed = match viewer {
        Some(viewer) if viewer != user.id => {
            st.relations
                .exists(RelationKind::Subscription, viewer, user.id)
                .await?
        }
        _ => false,
    };
    Ok(UserResponse {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        is_subscribed,
    })
}

pub async fn subscription_response(
    st: &AppState,
    author: &User,
    viewer: Option<i64>,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionResponse, ApiError> {
    let recipes = st
        .recipes
        .by_author(author.id, recipes_limit.map(|l| l.max(0)))
        .await?;
    let mut summaries = Vec::with_capacity(recipes.len());
    for recipe in &recipes {
        summaries.push(recipe_summary(st, recipe).await?);
    }
    Ok(SubscriptionResponse {
        user: user_response(st, author, viewer).await?,
        recipes: summaries,
        recipes_count: st.recipes.count_by_author(author.id).await?,
    })
}
