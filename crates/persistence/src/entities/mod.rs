//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod contact;
pub mod user;

pub use contact::ContactEntity;
pub use user::UserEntity;
