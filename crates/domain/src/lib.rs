//! Domain layer for the Contacts API backend.
//!
//! This crate contains:
//! - Domain models (User, Contact) and their request/response payloads
//! - Business logic that does not touch storage (birthday windows)

pub mod models;
pub mod services;
