use crate::domain::model::{AccessToken, StatementArtifact};
use crate::domain::ports::Uploader;
use crate::utils::error::{Result, StatementError};
use crate::utils::validation::{validate_non_empty_string, validate_readable_file};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tokio::sync::Mutex;

pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth 使用者授權憑證（含 refresh token），只由上傳器使用
#[derive(Clone, Deserialize)]
pub struct DriveCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl DriveCredentials {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        validate_readable_file("drive_creds", path)?;

        let content = std::fs::read_to_string(path)?;
        let credentials: Self = serde_json::from_str(&content).map_err(|e| {
            StatementError::config(format!(
                "Drive credentials in {} are malformed: {}",
                path.display(),
                e
            ))
        })?;
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<()> {
        validate_non_empty_string("drive.client_id", &self.client_id)?;
        validate_non_empty_string("drive.client_secret", &self.client_secret)?;
        validate_non_empty_string("drive.refresh_token", &self.refresh_token)?;
        crate::utils::validation::validate_url("drive.token_uri", &self.token_uri)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

pub struct GoogleDriveUploader {
    http: Client,
    credentials: DriveCredentials,
    upload_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleDriveUploader {
    pub fn new(http: Client, credentials: DriveCredentials) -> Self {
        Self::with_upload_url(http, credentials, DEFAULT_UPLOAD_URL)
    }

    pub fn with_upload_url(
        http: Client,
        credentials: DriveCredentials,
        upload_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            upload_url: upload_url.into(),
            token: Mutex::new(None),
        }
    }

    /// 每次執行只交換一次 access token
    async fn access_token(&self) -> Result<AccessToken> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&self.credentials.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| StatementError::upload(format!("Drive token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatementError::upload(format!(
                "Drive token refresh returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| StatementError::upload(format!("malformed Drive token response: {}", e)))?;
        let token = refreshed
            .access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| StatementError::upload("Drive token response has no access_token"))?;

        *cached = Some(token.clone());
        Ok(token)
    }
}

fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    artifact: &StatementArtifact,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(artifact.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!("Content-Type: {}\r\n\r\n", artifact.format().mime_type()).as_bytes(),
    );
    body.extend_from_slice(artifact.bytes());
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl Uploader for GoogleDriveUploader {
    async fn upload(&self, artifact: &StatementArtifact, destination: &str) -> Result<String> {
        let token = self.access_token().await?;

        let mut metadata = serde_json::json!({ "name": artifact.filename() });
        if !destination.trim().is_empty() {
            metadata["parents"] = serde_json::json!([destination]);
        }

        let boundary = format!(
            "statement_etl_{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let body = multipart_related_body(&boundary, &metadata, artifact);

        tracing::debug!(
            "Uploading {} ({} bytes) to Drive folder '{}'",
            artifact.filename(),
            artifact.len(),
            destination
        );
        let response = self
            .http
            .post(&self.upload_url)
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
            .bearer_auth(token.secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| StatementError::upload(format!("Drive upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatementError::upload(format!(
                "Drive returned HTTP {} for {}: {}",
                status.as_u16(),
                artifact.filename(),
                body
            )));
        }

        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| StatementError::upload(format!("malformed Drive response: {}", e)))?;

        Ok(file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id)))
    }
}
