//! Shared utilities and common types for the Contacts API backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Hashing helpers
//! - Password hashing with Argon2id
//! - JWT issuance and validation
//! - Common validation logic

pub mod crypto;
pub mod jwt;
pub mod password;
pub mod validation;
