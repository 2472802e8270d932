//! Zipline-style file host uploads
//!
//! One multipart POST to `{scheme}://{domain}/api/upload` with the archive in
//! a `file` field and the raw token in `authorization`. The host answers with
//! `{"files":[{"url":"..."}]}`.

use crate::config::FileHostConfig;
use crate::models::error::UploadError;
use crate::stores::artifact_trait::ArchiveUploader;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

const UPLOAD_PATH: &str = "/api/upload";
const FILE_FIELD: &str = "file";
const FALLBACK_MIME: &str = "application/octet-stream";
const BODY_EXCERPT_LEN: usize = 512;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    files: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(default)]
    url: Option<String>,
}

pub struct FileHostUploader {
    http_client: Client,
    config: FileHostConfig,
}

impl FileHostUploader {
    pub fn new(config: FileHostConfig) -> Result<Self, UploadError> {
        let http_client = Client::builder()
            .user_agent(concat!("quant-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn endpoint_url(&self) -> String {
        endpoint_url(&self.config.scheme, &self.config.domain)
    }

    fn credentials(&self) -> Result<(&str, &str), UploadError> {
        let domain = self.config.domain.trim();
        if domain.is_empty() {
            return Err(UploadError::Configuration("upload domain is not set".to_string()));
        }

        let token = self.config.token.expose_secret().trim();
        if token.is_empty() {
            return Err(UploadError::Configuration("upload token is not set".to_string()));
        }

        Ok((domain, token))
    }

    async fn archive_part(archive_path: &Path) -> Result<Part, UploadError> {
        let file = fs::File::open(archive_path).await?;
        let size = file.metadata().await?.len();

        let file_name = archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact.tar.gz")
            .to_string();
        let mime = mime_type_for(archive_path);

        debug!(file = %file_name, size = size, mime = mime, "Prepared multipart body");

        Ok(Part::stream_with_length(Body::from(file), size)
            .file_name(file_name)
            .mime_str(mime)?)
    }
}

#[async_trait::async_trait]
impl ArchiveUploader for FileHostUploader {
    fn name(&self) -> &str {
        "zipline"
    }

    fn destination(&self) -> String {
        self.endpoint_url()
    }

    async fn upload(&self, archive_path: &Path) -> Result<String, UploadError> {
        let (domain, token) = self.credentials()?;
        let url = endpoint_url(&self.config.scheme, domain);

        let form = Form::new().part(FILE_FIELD, Self::archive_part(archive_path).await?);

        info!(
            archive = %archive_path.display(),
            domain = %domain,
            "Uploading archive"
        );

        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UploadError::HttpError {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        parse_locator(&body)
    }
}

/// Upload `archive_path` to the host at `domain`, authenticating with `token`.
pub async fn upload_archive(archive_path: &Path, domain: &str, token: &str) -> Result<String, UploadError> {
    FileHostUploader::new(FileHostConfig::new(domain, token))?
        .upload(archive_path)
        .await
}

pub fn endpoint_url(scheme: &str, domain: &str) -> String {
    let scheme = if scheme.trim().is_empty() { "https" } else { scheme.trim() };
    format!("{}://{}{}", scheme, domain.trim().trim_end_matches('/'), UPLOAD_PATH)
}

pub fn mime_type_for(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(FALLBACK_MIME)
}

/// Extract `files[0].url` from a host response.
pub fn parse_locator(body: &str) -> Result<String, UploadError> {
    let response: UploadResponse = serde_json::from_str(body).map_err(|e| UploadError::Protocol {
        reason: format!("invalid JSON: {}", e),
        body: excerpt(body),
    })?;

    // Only the first entry is read; the rest may take any shape
    let first = response.files.into_iter().next().ok_or_else(|| UploadError::Protocol {
        reason: "response lists no files".to_string(),
        body: excerpt(body),
    })?;
    let first: UploadedFile = serde_json::from_value(first).map_err(|e| UploadError::Protocol {
        reason: format!("unexpected first file entry: {}", e),
        body: excerpt(body),
    })?;

    match first.url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(UploadError::Protocol {
            reason: "first file has no url".to_string(),
            body: excerpt(body),
        }),
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
