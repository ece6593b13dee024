//! Core use-case services.
//!
//! # Responsibility
//! - Present user operations as the single entry point for business logic.
//! - Keep callers decoupled from storage details.

pub mod user_service;
