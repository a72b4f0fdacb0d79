use tracing::info;

use super::{RelationKind, Target};
use crate::{
    error::ApiError, recipes::repo_types::Recipe, state::AppState, users::repo_types::User,
};

/// The entity a relation points at, loaded while checking it exists.
#[derive(Debug)]
pub enum Resolved {
    Recipe(Recipe),
    User(User),
}

async fn resolve_target(
    st: &AppState,
    kind: RelationKind,
    actor: i64,
    target_id: i64,
) -> Result<Resolved, ApiError> {
    match kind.target() {
        Target::Recipe => st
            .recipes
            .find(target_id)
            .await?
            .map(Resolved::Recipe)
            .ok_or_else(|| ApiError::not_found("Recipe not found.")),
        Target::User => {
            let user = st
                .users
                .find_by_id(target_id)
                .await?
                .ok_or_else(|| ApiError::not_found("User not found."))?;
            if kind == RelationKind::Subscription && user.id == actor {
                return Err(ApiError::SelfSubscription);
            }
            Ok(Resolved::User(user))
        }
    }
}

/// Creates the relation row. An existing row is a duplicate error, whether
/// seen by the pre-check or by the insert losing a race.
pub async fn add(
    st: &AppState,
    kind: RelationKind,
    actor: i64,
    target_id: i64,
) -> Result<Resolved, ApiError> {
    let target = resolve_target(st, kind, actor, target_id).await?;

    if st.relations.exists(kind, actor, target_id).await? {
        return Err(ApiError::Duplicate(kind.duplicate_message().into()));
    }
    if !st.relations.insert(kind, actor, target_id).await? {
        return Err(ApiError::Duplicate(kind.duplicate_message().into()));
    }

    info!(?kind, actor, target_id, "relation added");
    Ok(target)
}

pub async fn remove(
    st: &AppState,
    kind: RelationKind,
    actor: i64,
    target_id: i64,
) -> Result<(), ApiError> {
    resolve_target(st, kind, actor, target_id).await?;

    if !st.relations.delete(kind, actor, target_id).await? {
        return Err(ApiError::not_found(kind.missing_message()));
    }

    info!(?kind, actor, target_id, "relation removed");
    Ok(())
}
