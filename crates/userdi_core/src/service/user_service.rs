//! User use-case service.
//!
//! # Responsibility
//! - Expose create/get/update/delete user operations.
//! - Delegate persistence to one injected repository.
//!
//! # Invariants
//! - Repository errors reach the caller unchanged; nothing is retried.
//! - `update_user` is a non-atomic read-modify-write with last-write-wins
//!   semantics.

use crate::model::user::{User, UserId};
use crate::repo::user_repo::{RepoError, RepoResult, UserListQuery, UserRepository};
use log::{debug, warn};

/// User-facing operations.
pub trait UserService {
    /// Stores a new user and returns it with the assigned id.
    fn create_user(&self, name: &str, email: &str) -> RepoResult<User>;
    fn get_user(&self, id: UserId) -> RepoResult<User>;
    /// Overwrites name and email of an existing user and returns the result.
    fn update_user(&self, id: UserId, name: &str, email: &str) -> RepoResult<User>;
    fn delete_user(&self, id: UserId) -> RepoResult<()>;
    fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    fn list_users(&self, query: &UserListQuery) -> RepoResult<Vec<User>>;
}

/// Default service holding exactly one repository.
pub struct DefaultUserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> DefaultUserService<R> {
    /// Creates a service over the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

impl<R: UserRepository> UserService for DefaultUserService<R> {
    fn create_user(&self, name: &str, email: &str) -> RepoResult<User> {
        let mut user = User::new(name, email);
        match self.repo.create(&mut user) {
            Ok(()) => {
                debug!(
                    "event=user_create module=service status=ok user_id={}",
                    user.id.unwrap_or_default()
                );
                Ok(user)
            }
            Err(err) => {
                log_failure("user_create", &err);
                Err(err)
            }
        }
    }

    fn get_user(&self, id: UserId) -> RepoResult<User> {
        self.repo.get_by_id(id)
    }

    fn update_user(&self, id: UserId, name: &str, email: &str) -> RepoResult<User> {
        let mut user = self.repo.get_by_id(id)?;
        user.name = name.to_string();
        user.email = email.to_string();

        // A delete between the read above and this write surfaces here as
        // NotFound and is returned as-is.
        match self.repo.update(&user) {
            Ok(()) => {
                debug!("event=user_update module=service status=ok user_id={id}");
                Ok(user)
            }
            Err(err) => {
                log_failure("user_update", &err);
                Err(err)
            }
        }
    }

    fn delete_user(&self, id: UserId) -> RepoResult<()> {
        self.repo.delete(id)?;
        debug!("event=user_delete module=service status=ok user_id={id}");
        Ok(())
    }

    fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
        self.repo.find_by_email(email)
    }

    fn list_users(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        self.repo.list(query)
    }
}

fn log_failure(event: &str, err: &RepoError) {
    warn!(
        "event={event} module=service status=error error_kind={:?} error={err}",
        err.kind()
    );
}
