//! Cloudinary upload client.
//!
//! Document ingestion pushes the images referenced by markdown sources
//! (and the source PDFs themselves) to Cloudinary, then rewrites the
//! markdown to point at the hosted URLs. Uploads are signed requests:
//! a SHA-256 digest over the sorted parameter string plus the API secret.

use crate::config::CloudinaryConfig;
use crate::error::AppError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How many uploads run concurrently in a batch.
const UPLOAD_GROUP_SIZE: usize = 5;

/// An image read from a markdown folder, waiting for upload.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    /// The file name exactly as it appears inside the markdown link.
    pub origin_file_name: String,
    pub buffer: Vec<u8>,
}

/// An uploaded asset: the original link target plus its hosted URL.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub origin_file_name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    http: Client,
    config: CloudinaryConfig,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Uploads one image into `folder`, returning its hosted URL.
    pub async fn upload_image(
        &self,
        image: &ImageBuffer,
        folder: &str,
    ) -> Result<UploadedAsset, AppError> {
        let response = self
            .upload(&image.buffer, &[("folder", folder.to_string())])
            .await?;
        Ok(UploadedAsset {
            origin_file_name: image.origin_file_name.clone(),
            url: response.secure_url,
        })
    }

    /// Uploads a batch of images in groups of five concurrent requests,
    /// preserving input order.
    pub async fn upload_many(
        &self,
        images: &[ImageBuffer],
        folder: &str,
    ) -> Result<Vec<UploadedAsset>, AppError> {
        let mut uploaded = Vec::with_capacity(images.len());
        for group in images.chunks(UPLOAD_GROUP_SIZE) {
            let batch =
                try_join_all(group.iter().map(|image| self.upload_image(image, folder))).await?;
            uploaded.extend(batch);
        }
        info!("Uploaded {} images to folder {}", uploaded.len(), folder);
        Ok(uploaded)
    }

    /// Uploads a source PDF under a stable public id so the document link
    /// in answer citations stays the same across re-ingestions.
    pub async fn upload_pdf(
        &self,
        bytes: &[u8],
        public_id: &str,
    ) -> Result<(String, String), AppError> {
        let response = self
            .upload(
                bytes,
                &[
                    ("folder", "SourcePdfs".to_string()),
                    ("public_id", public_id.to_string()),
                ],
            )
            .await?;
        Ok((response.public_id, response.secure_url))
    }

    async fn upload(
        &self,
        bytes: &[u8],
        params: &[(&str, String)],
    ) -> Result<UploadResponse, AppError> {
        let timestamp = Utc::now().timestamp().to_string();

        let mut signed: Vec<(&str, String)> = params.to_vec();
        signed.push(("timestamp", timestamp.clone()));
        let signature = sign(&signed, &self.config.api_secret);

        let mime = infer::get(bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");
        let data_uri = format!("data:{};base64,{}", mime, BASE64.encode(bytes));

        let mut form: Vec<(&str, String)> = signed;
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));
        form.push(("file", data_uri));

        let url = format!(
            "{}/{}/auto/upload",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name
        );

        let res = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .form(&form)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Cloudinary upload failed with status {}: {}",
                status, body
            )));
        }

        res.json::<UploadResponse>()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed Cloudinary response: {}", e)))
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as a
/// query string, secret appended, SHA-256 hex digest.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by_key(|(name, _)| *name);

    let to_sign = sorted
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}
