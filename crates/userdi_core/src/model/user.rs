//! User domain model.
//!
//! # Responsibility
//! - Define the single CRUD entity managed by this crate.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes once set.
//! - `email` uniqueness is a store constraint, not checked here.
//! - Values handed to callers are owned copies with no link back to the store.

use serde::{Deserialize, Serialize};

/// Store-assigned user identifier.
pub type UserId = i64;

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// `None` until the store has persisted this user.
    pub id: Option<UserId>,
    /// Display name.
    pub name: String,
    /// Natural key; unique across all stored users.
    pub email: String,
}

impl User {
    /// Creates an unstored user. The store fills `id` on create.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
        }
    }

    /// Returns whether this value was read from or written to the store.
    pub fn is_stored(&self) -> bool {
        self.id.is_some()
    }
}
