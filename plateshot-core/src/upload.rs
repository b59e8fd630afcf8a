//! Publishing reference images to a public host.
//!
//! The generation service can only consume a reference image through a
//! publicly reachable URL. User-cropped photos arrive as local files or
//! inline base64 payloads, so they take a detour through a public image
//! host first. Plain request/response — no job row, no polling.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageReader;
use serde::Deserialize;
use std::io::Cursor;
use thiserror::Error;

/// Formats the host (and the generation service) will accept.
pub const ALLOWED_FORMATS: &[image::ImageFormat] = &[
    image::ImageFormat::Jpeg,
    image::ImageFormat::Png,
    image::ImageFormat::Gif,
    image::ImageFormat::WebP,
];

/// Maximum upload size (10MB).
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

const DEFAULT_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

/// A reference image that is not yet publicly reachable.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Base64(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read image: {0}")]
    Read(String),

    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),

    #[error("Upload failed: {0}")]
    Failed(String),
}

/// A public image host: bytes in, public URL out.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, source: &ImageSource) -> Result<String, UploadError>;
}

/// Normalize either source to a byte buffer. Inline payloads may carry a
/// `data:*;base64,` prefix.
fn load_bytes(source: &ImageSource) -> Result<Vec<u8>, UploadError> {
    match source {
        ImageSource::Path(path) => {
            std::fs::read(path).map_err(|e| UploadError::Read(format!("{}: {}", path.display(), e)))
        }
        ImageSource::Base64(payload) => {
            let encoded = match payload.split_once(";base64,") {
                Some((_, rest)) => rest,
                None => payload.as_str(),
            };
            BASE64
                .decode(encoded.trim())
                .map_err(|e| UploadError::InvalidPayload(e.to_string()))
        }
    }
}

/// Sniff the format from magic bytes and check it against the allow-list.
fn validate_image(data: &[u8]) -> Result<(), UploadError> {
    if data.len() > MAX_UPLOAD_SIZE {
        return Err(UploadError::InvalidPayload(format!(
            "image too large: {} bytes (max {})",
            data.len(),
            MAX_UPLOAD_SIZE
        )));
    }

    let format = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| UploadError::InvalidPayload(e.to_string()))?
        .format()
        .ok_or_else(|| UploadError::InvalidPayload("could not detect image format".to_string()))?;

    if !ALLOWED_FORMATS.contains(&format) {
        return Err(UploadError::InvalidPayload(format!(
            "unsupported image format: {:?}",
            format
        )));
    }

    Ok(())
}

/// imgbb-style host: a single form-upload endpoint keyed by a fixed access
/// key, returning a JSON envelope with the public URL.
pub struct ImgbbHost {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: String,
}

impl ImgbbHost {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
        }
    }

    /// Reads `PLATESHOT_IMAGE_HOST_KEY`; the host stays constructible without
    /// it so the pipeline can run for callers that never upload references.
    pub fn from_env() -> Self {
        Self::new(std::env::var("PLATESHOT_IMAGE_HOST_KEY").ok())
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    async fn upload(&self, source: &ImageSource) -> Result<String, UploadError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| UploadError::Failed("image host key not configured".to_string()))?;

        let bytes = load_bytes(source)?;
        validate_image(&bytes)?;

        let form = reqwest::multipart::Form::new()
            .text("key", api_key.clone())
            .text("image", BASE64.encode(&bytes));

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Failed(format!("HTTP {}: {}", status, body)));
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::Failed(format!("unexpected host response: {}", e)))?;

        tracing::info!(url = %parsed.data.url, "reference image published");
        Ok(parsed.data.url)
    }
}

/// Test double: returns a fixed URL (or a fixed failure) and counts uploads.
pub struct MockImageHost {
    result: Result<String, String>,
    uploads: Mutex<usize>,
}

impl MockImageHost {
    pub fn with_url(url: &str) -> Self {
        Self {
            result: Ok(url.to_string()),
            uploads: Mutex::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            uploads: Mutex::new(0),
        }
    }

    pub fn upload_count(&self) -> usize {
        *self.uploads.lock().unwrap()
    }
}

#[async_trait]
impl ImageHost for MockImageHost {
    async fn upload(&self, _source: &ImageSource) -> Result<String, UploadError> {
        *self.uploads.lock().unwrap() += 1;
        match &self.result {
            Ok(url) => Ok(url.clone()),
            Err(message) => Err(UploadError::Failed(message.clone())),
        }
    }
}
