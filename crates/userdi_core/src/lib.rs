//! Core of the user directory: model, repository and service layers.
//! Callers reach business logic only through `UserService`.

pub mod app;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use app::{build_user_service, run_demo, SqliteUserService};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::user::{User, UserId};
pub use repo::memory_repo::InMemoryUserRepository;
pub use repo::user_repo::{
    RepoError, RepoErrorKind, RepoResult, SqliteUserRepository, UserListQuery, UserRepository,
};
pub use service::user_service::{DefaultUserService, UserService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
