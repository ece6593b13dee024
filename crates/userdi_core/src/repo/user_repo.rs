//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `users` table.
//! - Translate SQLite constraint failures into semantic repository errors.
//!
//! # Invariants
//! - `id` is assigned by SQLite on insert and written back to the caller's
//!   value.
//! - Email uniqueness is enforced by `idx_users_email`, never pre-checked.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use crate::model::user::{User, UserId};
use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const USERS_TABLE: &str = "users";
const USER_SELECT_SQL: &str = "SELECT id, name, email FROM users";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user persistence operations.
#[derive(Debug)]
pub enum RepoError {
    /// No record has the requested id.
    NotFound(UserId),
    /// No record has the requested email.
    NotFoundByEmail(String),
    /// The email already belongs to another record.
    Conflict { email: String },
    /// Any other store failure.
    Storage(DbError),
    /// Contract misuse or unreadable persisted state.
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

/// Coarse classification of [`RepoError`] for callers that only branch on
/// the failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    NotFound,
    Conflict,
    Storage,
    InvalidInput,
}

impl RepoError {
    pub fn kind(&self) -> RepoErrorKind {
        match self {
            Self::NotFound(_) | Self::NotFoundByEmail(_) => RepoErrorKind::NotFound,
            Self::Conflict { .. } => RepoErrorKind::Conflict,
            Self::Storage(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_) => RepoErrorKind::Storage,
            Self::InvalidData(_) => RepoErrorKind::InvalidInput,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "user not found: {id}"),
            Self::NotFoundByEmail(email) => write!(f, "user not found for email `{email}`"),
            Self::Conflict { email } => write!(f, "email already in use: `{email}`"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid user data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection is not migrated: expected schema version {expected_version}, found {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}

/// Pagination options for listing users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListQuery {
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Persistence contract for users.
pub trait UserRepository {
    /// Inserts `user` and fills `user.id` with the store-assigned id.
    fn create(&self, user: &mut User) -> RepoResult<()>;
    fn get_by_id(&self, id: UserId) -> RepoResult<User>;
    /// Overwrites `name` and `email` of the record identified by `user.id`.
    fn update(&self, user: &User) -> RepoResult<()>;
    fn delete(&self, id: UserId) -> RepoResult<()>;
    fn find_by_email(&self, email: &str) -> RepoResult<User>;
    /// Lists users ordered by id ascending.
    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>>;
}

impl<T: UserRepository + ?Sized> UserRepository for &T {
    fn create(&self, user: &mut User) -> RepoResult<()> {
        (**self).create(user)
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        (**self).get_by_id(id)
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        (**self).update(user)
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        (**self).delete(id)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        (**self).find_by_email(email)
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        (**self).list(query)
    }
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` when the `users` table is absent.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create(&self, user: &mut User) -> RepoResult<()> {
        if let Some(id) = user.id {
            return Err(RepoError::InvalidData(format!(
                "create expects an unstored user, got id {id}"
            )));
        }

        self.conn
            .execute(
                "INSERT INTO users (name, email) VALUES (?1, ?2);",
                params![user.name.as_str(), user.email.as_str()],
            )
            .map_err(|err| map_write_error(err, &user.email))?;

        user.id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    fn get_by_id(&self, id: UserId) -> RepoResult<User> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_user_row(row),
            None => Err(RepoError::NotFound(id)),
        }
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        let id = user
            .id
            .ok_or_else(|| RepoError::InvalidData("update requires a stored user id".to_string()))?;

        let changed = self
            .conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2 WHERE id = ?3;",
                params![user.name.as_str(), user.email.as_str(), id],
            )
            .map_err(|err| map_write_error(err, &user.email))?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn delete(&self, id: UserId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM users WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn find_by_email(&self, email: &str) -> RepoResult<User> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE email = ?1;"))?;
        let mut rows = stmt.query([email])?;
        match rows.next()? {
            Some(row) => parse_user_row(row),
            None => Err(RepoError::NotFoundByEmail(email.to_string())),
        }
    }

    fn list(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        let mut sql = format!("{USER_SELECT_SQL} ORDER BY id ASC");
        let mut bind_values: Vec<Value> = Vec::new();

        match query.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                bind_values.push(Value::Integer(i64::from(limit)));
            }
            None => sql.push_str(" LIMIT -1 OFFSET ?"),
        }
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [USERS_TABLE],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Err(RepoError::MissingRequiredTable(USERS_TABLE));
    }

    Ok(())
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    Ok(User {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        email: row.get("email")?,
    })
}

fn map_write_error(err: rusqlite::Error, email: &str) -> RepoError {
    if is_unique_violation(&err) {
        RepoError::Conflict {
            email: email.to_string(),
        }
    } else {
        err.into()
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
