//! Avatar storage.
//!
//! New accounts get a Gravatar URL; uploaded images go to a pluggable
//! [`AvatarStore`], either the local disk (served under `/static/avatars`)
//! or Cloudinary.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::models::User;
use serde::Deserialize;
use shared::crypto::{normalize_email, sha256_hex};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;

/// Content types accepted for avatar uploads, with the extension used on disk.
pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

const CLOUDINARY_AVATAR_SIZE: u32 = 250;

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Avatar is too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Avatar file is empty")]
    Empty,

    #[error("Avatar storage not configured: {0}")]
    NotConfigured(String),

    #[error("Avatar storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Avatar upload failed: {0}")]
    Upload(String),
}

/// Gravatar URL for an email address.
pub fn gravatar_url(email: &str, size: u32) -> String {
    format!(
        "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
        sha256_hex(&normalize_email(email)),
        size
    )
}

/// Checks type and size of an upload, returning the file extension to use.
pub fn validate_upload(
    content_type: &str,
    size: usize,
    max: usize,
) -> Result<&'static str, AvatarError> {
    if size == 0 {
        return Err(AvatarError::Empty);
    }
    if size > max {
        return Err(AvatarError::TooLarge { size, max });
    }

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| AvatarError::UnsupportedType(content_type.to_string()))
}

/// Resolves the content type of a multipart part, guessing from the file
/// name when the client did not send one.
pub fn resolve_content_type(declared: Option<&str>, file_name: Option<&str>) -> String {
    match declared {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Stores the image for `user` and returns its public URL.
    async fn upload(
        &self,
        user: &User,
        bytes: Vec<u8>,
        extension: &str,
    ) -> Result<String, AvatarError>;

    fn name(&self) -> &'static str;
}

/// Builds the store selected by `storage.provider`.
pub fn store_from_config(config: &StorageConfig) -> Result<Arc<dyn AvatarStore>, AvatarError> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalAvatarStore::new(
            &config.local_dir,
            &config.public_base_url,
        ))),
        "cloudinary" => Ok(Arc::new(CloudinaryAvatarStore::new(config)?)),
        other => Err(AvatarError::NotConfigured(format!(
            "unknown storage provider '{}'",
            other
        ))),
    }
}

/// Writes avatars into a directory that is served statically.
#[derive(Debug, Clone)]
pub struct LocalAvatarStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalAvatarStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn upload(
        &self,
        user: &User,
        bytes: Vec<u8>,
        extension: &str,
    ) -> Result<String, AvatarError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // a previous upload may have used another format
        for (_, ext) in ALLOWED_CONTENT_TYPES {
            if *ext == extension {
                continue;
            }
            match tokio::fs::remove_file(self.dir.join(format!("{}.{}", user.id, ext))).await {
                Ok(()) => debug!(user_id = %user.id, ext, "Removed stale avatar"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let file_name = format!("{}.{}", user.id, extension);
        tokio::fs::write(self.dir.join(&file_name), &bytes).await?;

        info!(user_id = %user.id, bytes = bytes.len(), "Avatar stored locally");

        Ok(format!(
            "{}/{}?v={}",
            self.public_base_url,
            file_name,
            Utc::now().timestamp()
        ))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Signed uploads to Cloudinary.
#[derive(Debug, Clone)]
pub struct CloudinaryAvatarStore {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    public_id: String,
    version: u64,
}

impl CloudinaryAvatarStore {
    pub fn new(config: &StorageConfig) -> Result<Self, AvatarError> {
        if config.cloudinary_cloud_name.is_empty()
            || config.cloudinary_api_key.is_empty()
            || config.cloudinary_api_secret.is_empty()
        {
            return Err(AvatarError::NotConfigured(
                "cloudinary_cloud_name, cloudinary_api_key and cloudinary_api_secret are required"
                    .into(),
            ));
        }

        Ok(Self {
            cloud_name: config.cloudinary_cloud_name.clone(),
            api_key: config.cloudinary_api_key.clone(),
            api_secret: config.cloudinary_api_secret.clone(),
            folder: config.cloudinary_folder.clone(),
            http: reqwest::Client::new(),
        })
    }

    /// Asset key for a user. Usernames are neither unique nor restricted,
    /// so the key is the user id.
    pub fn public_id(&self, user_id: Uuid) -> String {
        format!("{}/{}", self.folder, user_id)
    }

    /// Delivery URL cropped to a square avatar.
    pub fn delivery_url(&self, public_id: &str, version: u64) -> String {
        format!(
            "https://res.cloudinary.com/{}/image/upload/c_fill,h_{size},w_{size}/v{}/{}",
            self.cloud_name,
            version,
            public_id,
            size = CLOUDINARY_AVATAR_SIZE
        )
    }
}

/// Cloudinary request signature: the signed params sorted by name, joined as
/// `k=v&k=v`, with the API secret appended, hashed with SHA-256.
pub fn cloudinary_signature(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    sha256_hex(&format!("{}{}", joined, api_secret))
}

#[async_trait]
impl AvatarStore for CloudinaryAvatarStore {
    async fn upload(
        &self,
        user: &User,
        bytes: Vec<u8>,
        extension: &str,
    ) -> Result<String, AvatarError> {
        let public_id = self.public_id(user.id);
        let timestamp = Utc::now().timestamp().to_string();
        let signed = [
            ("overwrite", "true".to_string()),
            ("public_id", public_id.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = cloudinary_signature(&signed, &self.api_secret);

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("avatar.{}", extension));
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("overwrite", "true")
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AvatarError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AvatarError::Upload(format!(
                "Cloudinary returned {}: {}",
                status, body
            )));
        }

        let uploaded: CloudinaryUploadResponse = response
            .json()
            .await
            .map_err(|e| AvatarError::Upload(e.to_string()))?;

        info!(user_id = %user.id, public_id = %uploaded.public_id, "Avatar uploaded to Cloudinary");

        Ok(self.delivery_url(&uploaded.public_id, uploaded.version))
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}
