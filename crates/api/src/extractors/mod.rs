//! Custom Axum extractors.
//!
//! Extractors for the authenticated user and for validated request data.

pub mod current_user;
pub mod validated;

pub use current_user::{BearerToken, CurrentUser};
pub use validated::{ApiForm, ApiPath, ValidatedJson, ValidatedQuery};
