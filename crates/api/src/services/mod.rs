//! Application services and external integrations.

pub mod auth;
pub mod avatar;
pub mod email;
pub mod user_cache;

pub use auth::AuthService;
pub use avatar::AvatarStore;
pub use email::EmailService;
pub use user_cache::UserCache;
