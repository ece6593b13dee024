//! In-memory user repository.
//!
//! # Responsibility
//! - Implement `UserRepository` without SQLite for tests and demos.
//! - Mirror the SQLite adapter's error semantics, including email conflicts.
//!
//! # Invariants
//! - Ids start at 1, increase monotonically and are never reused.
//! - The mutex is the store's own lock; callers add none.

use crate::db::DbError;
use crate::model::user::{User, UserId};
use crate::repo::user_repo::{RepoError, RepoResult, UserListQuery, UserRepository};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe in-memory store implementing the user repository contract.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    rows: BTreeMap<UserId, User>,
    last_id: UserId,
    injected_failure: Option<String>,
}

impl InMemoryState {
    fn take_injected_failure(&mut self) -> RepoResult<()> {
        match self.injected_failure.take() {
            Some(message) => Err(RepoError::Storage(DbError::Unavailable(message))),
            None => Ok(()),
        }
    }

    fn email_taken_by_other(&self, email: &str, id: Option<UserId>) -> bool {
        self.rows
            .values()
            .any(|row| row.email == email && row.id != id)
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next repository call fail with a storage error.
    pub fn fail_next_with_storage(&self, message: impl Into<String>) -> RepoResult<()> {
        self.lock()?.injected_failure = Some(message.into());
        Ok(())
    }

    /// Number of stored users.
    pub fn len(&self) -> RepoResult<usize> {
        Ok(self.lock()?.rows.len())
    }

    pub fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.lock()?.rows.is_empty())
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|_| {
            RepoError::Storage(DbError::Unavailable(
                "in-memory user store lock poisoned".to_string(),
            ))
        })
    }
}

impl UserRepository for InMemoryUserRepository {
    fn create(&self, user: &mut User) -> RepoResult<()> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        if let Some(id) = user.id {
            return Err(RepoError::InvalidData(format!(
                "create expects an unstored user, got id {id}"
            )));
        }
        if state.email_taken_by_other(&user.email, None) {
            return Err(RepoError::Conflict {
                email: user.email.clone(),
            });
        }

        state.last_id += 1;
        let id = state.last_id;
        user.id = Some(id);
        state.rows.insert(id, user.clone());
        Ok(())
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        state.rows.get(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        let id = user
            .id
            .ok_or_else(|| RepoError::InvalidData("update requires a stored user id".to_string()))?;
        if !state.rows.contains_key(&id) {
            return Err(RepoError::NotFound(id));
        }
        if state.email_taken_by_other(&user.email, Some(id)) {
            return Err(RepoError::Conflict {
                email: user.email.clone(),
            });
        }

        state.rows.insert(id, user.clone());
        Ok(())
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        state
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound(id))
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        state
            .rows
            .values()
            .find(|row| row.email == email)
            .cloned()
            .ok_or_else(|| RepoError::NotFoundByEmail(email.to_string()))
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        let mut state = self.lock()?;
        state.take_injected_failure()?;

        let rows = state.rows.values().skip(query.offset as usize);
        let users = match query.limit {
            Some(limit) => rows.take(limit as usize).cloned().collect(),
            None => rows.cloned().collect(),
        };
        Ok(users)
    }
}
