//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the user persistence contract independent of storage technology.
//! - Isolate SQLite query details from the service layer.
//!
//! # Invariants
//! - Every adapter reports absence as `NotFound` and duplicate emails as
//!   `Conflict`, whatever the backing store signals natively.

pub mod memory_repo;
pub mod user_repo;
