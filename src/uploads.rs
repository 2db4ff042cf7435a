use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;

const AUDIO_DIR: &str = "audio";
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredUpload {
    pub key: String,
    pub url: String,
}

/// Writes uploaded media under a root directory that Rocket serves at `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, data_base64), fields(size = data_base64.len()))]
    pub async fn store_audio(
        &self,
        file_name: &str,
        data_base64: &str,
        content_type: &str,
    ) -> Result<StoredUpload, AppError> {
        let mime = content_type.trim().to_ascii_lowercase();
        if !(mime.starts_with("audio/") || mime.starts_with("video/")) {
            return Err(AppError::Validation(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }

        // Browsers hand over data URLs; only the payload after the comma is base64.
        let payload = match data_base64.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => data_base64,
        }
        .trim();

        if payload.len() / 4 * 3 > self.max_bytes + 3 {
            return Err(self.too_large());
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| AppError::Validation(format!("File data is not valid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(self.too_large());
        }

        let key = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name));
        let dir = self.root.join(AUDIO_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&key), &bytes).await?;

        info!(key = %key, bytes = bytes.len(), "Stored audio upload");
        Ok(StoredUpload {
            url: format!("/uploads/{}/{}", AUDIO_DIR, key),
            key: format!("{}/{}", AUDIO_DIR, key),
        })
    }

    fn too_large(&self) -> AppError {
        AppError::Validation(format!(
            "File exceeds the {} byte upload limit",
            self.max_bytes
        ))
    }
}

/// Base name only, restricted to `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
