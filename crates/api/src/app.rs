use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use shared::jwt::JwtError;

use crate::config::Config;
use crate::error::ApiError;
use crate::middleware::{
    contacts_rate_limit, metrics_handler, metrics_middleware, require_user_auth, trace_id,
    RateLimiterState,
};
use crate::routes::{auth, contacts, health, users};
use crate::services::{
    avatar::{store_from_config, AvatarError, AvatarStore},
    email::{EmailError, EmailService},
    AuthService, UserCache,
};

/// Failures while wiring up the application from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("JWT configuration: {0}")]
    Jwt(#[from] JwtError),

    #[error("Email configuration: {0}")]
    Email(#[from] EmailError),

    #[error("Avatar storage configuration: {0}")]
    Avatar(#[from] AvatarError),
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub email: EmailService,
    pub avatars: Arc<dyn AvatarStore>,
    pub user_cache: Option<Arc<UserCache>>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> Result<Self, StartupError> {
        let config = Arc::new(config);

        let jwt = Arc::new(config.jwt.build()?);

        let user_cache = config.cache.enabled.then(|| {
            Arc::new(UserCache::new(Duration::from_secs(
                config.cache.user_ttl_secs,
            )))
        });

        let auth = Arc::new(AuthService::new(
            pool.clone(),
            jwt,
            user_cache.clone(),
            config.storage.gravatar_size,
        ));

        // 0 disables rate limiting
        let rate_limiter = RateLimiterState::new(config.security.contacts_rate_limit_per_minute)
            .map(Arc::new);

        Ok(Self {
            email: EmailService::new(config.email.clone())?,
            avatars: store_from_config(&config.storage)?,
            pool,
            auth,
            user_cache,
            rate_limiter,
            config,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("email", &self.email)
            .field("avatars", &self.avatars.name())
            .field("user_cache", &self.user_cache)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

pub fn create_app(config: Config, pool: PgPool) -> Result<Router, StartupError> {
    Ok(router(AppState::new(config, pool)?))
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        // any origin (development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let auth_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh_token", get(auth::refresh_token))
        .route(
            "/api/auth/confirmed_email/:token",
            get(auth::confirmed_email),
        )
        .route("/api/auth/request_email", post(auth::request_email));

    let user_routes = Router::new()
        .route("/api/users/me", get(users::get_current_user))
        .route("/api/users/avatar", patch(users::update_avatar))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    // Only listing is rate limited. Auth is the outer route layer, so the
    // limiter sees the resolved user.
    let contact_routes = Router::new()
        .route(
            "/api/contacts",
            get(contacts::list_contacts)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    contacts_rate_limit,
                ))
                .post(contacts::create_contact),
        )
        .route("/api/contacts/search", get(contacts::search_contacts))
        .route(
            "/api/contacts/birthdays",
            get(contacts::upcoming_birthday_contacts),
        )
        .route(
            "/api/contacts/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let public_routes = Router::new()
        .route("/", get(health::index))
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let mut app = Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(user_routes)
        .merge(contact_routes);

    // absolute URLs mean a fronting server or CDN serves the files
    let avatar_path = config.storage.public_base_url.trim_end_matches('/');
    if config.storage.provider == "local" && avatar_path.starts_with('/') && avatar_path.len() > 1
    {
        app = app.nest_service(avatar_path, ServeDir::new(&config.storage.local_dir));
    }

    app.fallback(|| async { ApiError::NotFound("Not found".into()) })
        // Global middleware (order matters: bottom layers run first)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
