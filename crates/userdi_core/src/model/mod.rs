//! Domain model for the user directory.
//!
//! # Responsibility
//! - Define the plain record types shared by repository and service layers.
//!
//! # Invariants
//! - Model types carry no persistence annotations; the schema lives in
//!   `db/migrations`.

pub mod user;
