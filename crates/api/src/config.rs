use serde::Deserialize;
use std::net::SocketAddr;

pub use persistence::db::DatabaseConfig;
use shared::jwt::{JwtConfig, JwtError, TokenLifetimes};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// JWT authentication configuration
    pub jwt: JwtAuthConfig,
    /// Email service configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// Avatar storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// In-memory current-user cache
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound for any request body, avatar uploads included.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json`, `compact` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Requests per minute per user on the contact list endpoint (0 disables).
    #[serde(default = "default_contacts_rate_limit")]
    pub contacts_rate_limit_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            contacts_rate_limit_per_minute: default_contacts_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// `HS256` (uses `secret`) or `RS256` (uses the PEM key pair)
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,

    #[serde(default)]
    pub secret: String,

    /// RSA private key in PEM format for signing tokens
    #[serde(default)]
    pub private_key: String,

    /// RSA public key in PEM format for verifying tokens
    #[serde(default)]
    pub public_key: String,

    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry_secs: i64,

    #[serde(default = "default_email_token_expiry")]
    pub email_token_expiry_secs: i64,

    /// Leeway in seconds for clock skew tolerance
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

impl JwtAuthConfig {
    /// Builds the signing/validation config for the configured algorithm.
    pub fn build(&self) -> Result<JwtConfig, JwtError> {
        let lifetimes = TokenLifetimes {
            access_secs: self.access_token_expiry_secs,
            refresh_secs: self.refresh_token_expiry_secs,
            email_secs: self.email_token_expiry_secs,
        };

        match JwtConfig::parse_algorithm(&self.algorithm)? {
            jsonwebtoken::Algorithm::RS256 => JwtConfig::from_rsa_pem(
                &self.private_key,
                &self.public_key,
                lifetimes,
                self.leeway_secs,
            ),
            _ => JwtConfig::from_secret(&self.secret, lifetimes, self.leeway_secs),
        }
    }
}

/// Email service configuration for sending verification emails.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether email sending is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Email provider: smtp, sendgrid, or console (for development)
    #[serde(default = "default_email_provider")]
    pub provider: String,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    /// `tls` (implicit TLS, port 465), `starttls` (port 587) or `none`
    #[serde(default = "default_smtp_security")]
    pub smtp_security: String,

    #[serde(default)]
    pub sendgrid_api_key: String,

    /// Sender email address (From header)
    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    /// Sender name (From header)
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    /// Public base URL used in verification links. When empty the request's
    /// Host header is used instead.
    #[serde(default)]
    pub base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_security: default_smtp_security(),
            sendgrid_api_key: String::new(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            base_url: String::new(),
        }
    }
}

/// Where uploaded avatars are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `local` or `cloudinary`
    #[serde(default = "default_storage_provider")]
    pub provider: String,

    /// Directory for the local provider
    #[serde(default = "default_local_dir")]
    pub local_dir: String,

    /// URL prefix under which `local_dir` is served
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_max_avatar_bytes")]
    pub max_avatar_bytes: usize,

    #[serde(default)]
    pub cloudinary_cloud_name: String,

    #[serde(default)]
    pub cloudinary_api_key: String,

    #[serde(default)]
    pub cloudinary_api_secret: String,

    #[serde(default = "default_cloudinary_folder")]
    pub cloudinary_folder: String,

    /// Pixel size requested from Gravatar for default avatars
    #[serde(default = "default_gravatar_size")]
    pub gravatar_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            local_dir: default_local_dir(),
            public_base_url: default_public_base_url(),
            max_avatar_bytes: default_max_avatar_bytes(),
            cloudinary_cloud_name: String::new(),
            cloudinary_api_key: String::new(),
            cloudinary_api_secret: String::new(),
            cloudinary_folder: default_cloudinary_folder(),
            gravatar_size: default_gravatar_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a resolved user stays cached
    #[serde(default = "default_user_ttl")]
    pub user_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_ttl_secs: default_user_ttl(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    4 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_contacts_rate_limit() -> u32 {
    10
}
fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}
fn default_access_token_expiry() -> i64 {
    900 // 15 minutes
}
fn default_refresh_token_expiry() -> i64 {
    604_800 // 7 days
}
fn default_email_token_expiry() -> i64 {
    604_800 // 7 days
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_email_provider() -> String {
    "console".to_string()
}
fn default_smtp_port() -> u16 {
    465
}
fn default_smtp_security() -> String {
    "tls".to_string()
}
fn default_sender_email() -> String {
    "noreply@contacts.local".to_string()
}
fn default_sender_name() -> String {
    "Contacts API".to_string()
}
fn default_storage_provider() -> String {
    "local".to_string()
}
fn default_local_dir() -> String {
    "uploads/avatars".to_string()
}
fn default_public_base_url() -> String {
    "/static/avatars".to_string()
}
fn default_max_avatar_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_cloudinary_folder() -> String {
    "ContactsApp".to_string()
}
fn default_gravatar_size() -> u32 {
    200
}
fn default_true() -> bool {
    true
}
fn default_user_ttl() -> u64 {
    900
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with CONTACTS__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("CONTACTS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8000

            [database]
            url = ""

            [logging]
            level = "info"
            format = "json"

            [jwt]
            algorithm = "HS256"
            secret = "unit-test-secret"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "CONTACTS__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        match self.jwt.algorithm.to_ascii_uppercase().as_str() {
            "HS256" if self.jwt.secret.is_empty() => {
                return Err(ConfigValidationError::MissingRequired(
                    "CONTACTS__JWT__SECRET must be set for HS256".to_string(),
                ))
            }
            "RS256" if self.jwt.private_key.is_empty() || self.jwt.public_key.is_empty() => {
                return Err(ConfigValidationError::MissingRequired(
                    "CONTACTS__JWT__PRIVATE_KEY and CONTACTS__JWT__PUBLIC_KEY must be set for RS256"
                        .to_string(),
                ))
            }
            "HS256" | "RS256" => {}
            other => {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "Unsupported JWT algorithm: {}",
                    other
                )))
            }
        }

        if self.storage.max_avatar_bytes > self.server.max_body_size {
            return Err(ConfigValidationError::InvalidValue(
                "storage.max_avatar_bytes cannot exceed server.max_body_size".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
