//! Bean image storage on Cloudinary
//!
//! Signed uploads: parameters are sorted, joined as `k=v&...`, suffixed with
//! the API secret and hashed with SHA-256. The image travels as a base64 JPEG
//! data URI in the form body.
//!
//! # API Reference
//! - Upload: `POST https://api.cloudinary.com/v1_1/{cloud}/image/upload`
//! - Delete: `POST https://api.cloudinary.com/v1_1/{cloud}/image/destroy`

use async_trait::async_trait;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CollaboratorError, ImageUploader, UploadResult};
use cqm_common::config::CloudinaryConfig;

const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Limit stored images to 500×500 and let Cloudinary pick the JPEG quality
const UPLOAD_TRANSFORMATION: &str = "c_limit,h_500,w_500/q_auto:good";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Signed Cloudinary uploader
pub struct CloudinaryUploader {
    http_client: Client,
    api_base: String,
    config: CloudinaryConfig,
}

impl CloudinaryUploader {
    pub fn new(config: CloudinaryConfig) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CollaboratorError::Configuration(format!("HTTP client: {}", e)))?;

        info!(
            cloud = %config.cloud_name,
            folder = %config.folder,
            "Cloudinary image storage enabled"
        );

        Ok(Self {
            http_client,
            api_base: CLOUDINARY_API_BASE.to_string(),
            config,
        })
    }

    /// Point the client at another API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.config.cloud_name, action)
    }

    /// Public id of a bean image: `grains/{session_tag}/grain_{index}`
    pub fn grain_public_id(session_tag: &str, bean_index: usize) -> String {
        format!("grains/{}/grain_{}", session_tag, bean_index)
    }

    /// SHA-256 request signature over the sorted parameters
    pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(api_secret.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let signature = Self::sign(&params, &self.config.api_secret);
        params.push(("api_key", self.config.api_key.clone()));
        params.push(("signature", signature));
        params.push(("signature_algorithm", "sha256".to_string()));
        params
    }

    async fn upload(
        &self,
        image: &RgbImage,
        public_id: &str,
    ) -> Result<UploadResponse, CollaboratorError> {
        let mut jpeg = Vec::new();
        image.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
        let data_uri = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&jpeg)
        );

        let mut form = self.signed_form(vec![
            ("folder", self.config.folder.clone()),
            ("public_id", public_id.to_string()),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
            ("transformation", UPLOAD_TRANSFORMATION.to_string()),
        ]);
        form.push(("file", data_uri));

        let response = self
            .http_client
            .post(self.endpoint("upload"))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Service(format!(
                "Upload returned HTTP {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn destroy(&self, public_id: &str) -> Result<DestroyResponse, CollaboratorError> {
        let form = self.signed_form(vec![
            ("public_id", public_id.to_string()),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
        ]);

        let response = self
            .http_client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ImageUploader for CloudinaryUploader {
    async fn upload_grain_image(
        &self,
        image: &RgbImage,
        session_tag: &str,
        bean_index: usize,
    ) -> UploadResult {
        let public_id = Self::grain_public_id(session_tag, bean_index);

        match self.upload(image, &public_id).await {
            Ok(uploaded) => {
                debug!(public_id = %uploaded.public_id, "Grain image uploaded");
                UploadResult::uploaded(uploaded.secure_url, uploaded.public_id)
            }
            Err(e) => {
                warn!(public_id = %public_id, "Grain image upload failed: {}", e);
                UploadResult::failed(e.to_string())
            }
        }
    }

    async fn delete_image(&self, public_id: &str) -> bool {
        match self.destroy(public_id).await {
            Ok(response) => response.result == "ok",
            Err(e) => {
                warn!(public_id = %public_id, "Grain image delete failed: {}", e);
                false
            }
        }
    }
}

/// Uploader used when no image storage is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUploader;

#[async_trait]
impl ImageUploader for NoopUploader {
    async fn upload_grain_image(
        &self,
        _image: &RgbImage,
        _session_tag: &str,
        _bean_index: usize,
    ) -> UploadResult {
        UploadResult::failed("Image storage not configured")
    }

    async fn delete_image(&self, _public_id: &str) -> bool {
        false
    }
}
