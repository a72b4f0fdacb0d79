//! User-owned relations: favorites, shopping cart entries and subscriptions.
//!
//! The three relations share one add/remove contract. `RelationKind` carries
//! everything that differs between them: the join table, the column holding the
//! target id, and the messages reported to the client.

pub mod repo;
pub mod services;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// user -> recipe
    Favorite,
    /// user -> recipe
    Cart,
    /// subscriber -> author
    Subscription,
}

/// Which entity the relation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Recipe,
    User,
}

impl RelationKind {
    pub fn table(self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorites",
            RelationKind::Cart => "cart_entries",
            RelationKind::Subscription => "subscriptions",
        }
    }

    pub fn target_column(self) -> &'static str {
        match self {
            RelationKind::Favorite | RelationKind::Cart => "recipe_id",
            RelationKind::Subscription => "author_id",
        }
    }

    pub fn target(self) -> Target {
        match self {
            RelationKind::Favorite | RelationKind::Cart => Target::Recipe,
            RelationKind::Subscription => Target::User,
        }
    }

    pub fn duplicate_message(self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is already in favorites.",
            RelationKind::Cart => "Recipe is already in the shopping cart.",
            RelationKind::Subscription => "You are already subscribed to this user.",
        }
    }

    pub fn missing_message(self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is not in favorites.",
            RelationKind::Cart => "Recipe is not in the shopping cart.",
            RelationKind::Subscription => "You are not subscribed to this user.",
        }
    }
}
