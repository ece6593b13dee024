//! Composition root.
//!
//! # Responsibility
//! - Build the concrete repository over a store handle and inject it into
//!   the service.
//! - Run the illustrative create-then-fetch flow.
//!
//! # Invariants
//! - No business logic lives here; state is passed in, never held globally.

use crate::model::user::User;
use crate::repo::user_repo::{RepoError, RepoResult, SqliteUserRepository};
use crate::service::user_service::{DefaultUserService, UserService};
use log::{error, info};
use rusqlite::Connection;

/// Name of the user created by [`run_demo`].
pub const DEMO_USER_NAME: &str = "John Doe";
/// Email of the user created by [`run_demo`]; a second run conflicts on it.
pub const DEMO_USER_EMAIL: &str = "john@example.com";

/// Service type produced by [`build_user_service`].
pub type SqliteUserService<'conn> = DefaultUserService<SqliteUserRepository<'conn>>;

/// Wires a SQLite-backed user service over a migrated connection.
pub fn build_user_service(conn: &Connection) -> RepoResult<SqliteUserService<'_>> {
    let repo = SqliteUserRepository::try_new(conn).map_err(|err| {
        error!("event=service_build module=app status=error store=sqlite error={err}");
        err
    })?;

    info!("event=service_build module=app status=ok store=sqlite");
    Ok(DefaultUserService::new(repo))
}

/// Creates the demo user and reads it back by its assigned id.
///
/// Stops at the first error and returns it unchanged.
pub fn run_demo<S: UserService + ?Sized>(service: &S) -> RepoResult<User> {
    let created = service.create_user(DEMO_USER_NAME, DEMO_USER_EMAIL)?;
    let id = created
        .id
        .ok_or_else(|| RepoError::InvalidData("created user has no id".to_string()))?;
    service.get_user(id)
}
