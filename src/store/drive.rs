use super::auth::{Authenticator, StoredToken};
use super::RemoteFileStore;
use crate::models::{RemoteFile, HEIC_MIME_TYPES};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::sync::Mutex;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const PAGE_SIZE: &str = "1000";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, mimeType, parents)";
const MAX_PREALLOCATION: u64 = 64 << 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    // Drive reports int64 fields as decimal strings
    size: Option<String>,
    mime_type: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        RemoteFile {
            size_bytes: file
                .size
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            container_id: file.parents.into_iter().next(),
        }
    }
}

/// Google Drive v3 REST client.
pub struct DriveClient {
    client: Client,
    base_url: String,
    token: Mutex<StoredToken>,
    auth: Option<Authenticator>,
}

impl DriveClient {
    /// Authorize through `auth` and keep it around for token refreshes.
    pub async fn connect(auth: Authenticator) -> Result<Self> {
        let token = auth.authorize().await?;
        Ok(Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: Mutex::new(token),
            auth: Some(auth),
        })
    }

    /// Use a fixed token; requests fail once it expires.
    pub fn with_token(token: StoredToken) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: Mutex::new(token),
            auth: None,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn bearer(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.is_fresh(Utc::now()) {
            let auth = self.auth.as_ref().ok_or_else(|| {
                Error::Auth("Access token expired and cannot be refreshed".to_string())
            })?;
            *token = auth.refresh(&token).await?;
        }
        Ok(token.access_token.clone())
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await?;
        tracing::error!("Drive API error while {} (status {}): {}", action, status, error_text);
        Err(Error::RemoteStore(format!(
            "Drive API error while {} (status {}): {}",
            action, status, error_text
        )))
    }

    fn file_url(&self, remote_id: &str) -> String {
        format!("{}/drive/v3/files/{}", self.base_url, remote_id)
    }
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Drive search query for HEIC candidates, optionally within one folder.
pub fn build_list_query(container_id: Option<&str>, name_filters: &[&str]) -> String {
    let mut terms: Vec<String> = HEIC_MIME_TYPES
        .iter()
        .map(|mime| format!("mimeType='{}'", mime))
        .collect();

    for filter in name_filters {
        let lower = escape_query_value(&filter.to_lowercase());
        let upper = escape_query_value(&filter.to_uppercase());
        terms.push(format!("name contains '{}'", lower));
        if upper != lower {
            terms.push(format!("name contains '{}'", upper));
        }
    }

    let mut query = format!("({}) and trashed = false", terms.join(" or "));
    if let Some(folder) = container_id {
        query = format!("'{}' in parents and {}", escape_query_value(folder), query);
    }
    query
}

#[async_trait]
impl RemoteFileStore for DriveClient {
    async fn list(
        &self,
        container_id: Option<&str>,
        name_filters: &[&str],
    ) -> Result<Vec<RemoteFile>> {
        let query = build_list_query(container_id, name_filters);
        tracing::debug!("Listing Drive files with query: {}", query);

        let url = format!("{}/drive/v3/files", self.base_url);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("pageSize", PAGE_SIZE.to_string()),
                ("fields", LIST_FIELDS.to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(self.bearer().await?)
                .query(&params)
                .send()
                .await?;
            let page: FileList = Self::check(response, "listing files").await?.json().await?;

            files.extend(page.files.into_iter().map(RemoteFile::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!("Found {} HEIC files", files.len());
        Ok(files)
    }

    async fn fetch(&self, remote_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.file_url(remote_id))
            .bearer_auth(self.bearer().await?)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let mut response = Self::check(response, "downloading").await?;

        // Content-Length is untrusted, so it only bounds the initial reservation
        let total = response.content_length();
        let mut data = Vec::with_capacity(total.map_or(0, |t| t.min(MAX_PREALLOCATION) as usize));
        let mut last_percent = 0;

        while let Some(chunk) = response.chunk().await? {
            data.extend_from_slice(&chunk);
            if let Some(total) = total.filter(|&t| t > 0) {
                let percent = data.len() as u64 * 100 / total;
                if percent >= last_percent + 25 || (percent == 100 && last_percent != 100) {
                    tracing::debug!("Downloading {}: {}%", remote_id, percent);
                    last_percent = percent;
                }
            }
        }

        Ok(data)
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.file_url(remote_id))
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        Self::check(response, "deleting").await?;
        Ok(())
    }
}
