//! Asset uploads to the hosted media service.
//!
//! Uploads are unsigned: the preset named in [`UploadConfig`] carries the
//! service-side processing rules, so no credential ever reaches the client.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MediaError, Result};

/// Where uploads go and under which preset.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base URL of the upload API, without a trailing slash.
    pub endpoint: String,
    /// Name of the unsigned upload preset.
    pub preset: String,
}

/// The service's record of a stored asset.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedAsset {
    /// HTTPS delivery URL, the only field the chat payload keeps.
    pub secure_url: String,
    pub public_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

/// The upload boundary the client talks to.  [`MediaUploader`] is the
/// production implementation; tests substitute a recorder.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadedAsset>;
}

pub struct MediaUploader {
    client: reqwest::Client,
    config: UploadConfig,
}

impl MediaUploader {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AssetUploader for MediaUploader {
    /// Upload one file and return the stored asset record.
    ///
    /// The service has no dedicated audio pipeline; audio uploads go up
    /// under the `video` resource type, everything else autodetects.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadedAsset> {
        let url = format!(
            "{}/{}/upload",
            self.config.endpoint.trim_end_matches('/'),
            resource_type_for(mime_type)
        );

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.config.preset.clone());

        debug!(%url, file_name, "uploading asset");
        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaError::UploadRejected(rejection_message(status, &body)));
        }

        let asset: UploadedAsset = resp.json().await?;
        info!(url = %asset.secure_url, "asset uploaded");
        Ok(asset)
    }
}

fn resource_type_for(mime_type: &str) -> &'static str {
    if mime_type.starts_with("audio/") {
        "video"
    } else {
        "auto"
    }
}

/// Pull the human-readable message out of a `{"error":{"message":...}}`
/// body, falling back to the status line.
fn rejection_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")?
                .get("message")?
                .as_str()
                .map(String::from)
        });
    match detail {
        Some(message) => message,
        None => format!("service replied {status}"),
    }
}
