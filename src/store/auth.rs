//! OAuth 2.0 token lifecycle for the Drive API
//!
//! Tokens are cached in a JSON file. A cached token is reused while it is
//! fresh, refreshed when it has expired, and obtained through the installed
//! application consent flow when there is none.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Auth(format!(
                "Credentials file '{}' not found. Download an OAuth client for a desktop app from the Google Cloud Console.",
                path.display()
            )));
        }

        let file: ClientSecretsFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        file.installed.or(file.web).ok_or_else(|| {
            Error::Auth(format!(
                "Credentials file '{}' has neither an 'installed' nor a 'web' client",
                path.display()
            ))
        })
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Tokens without a recorded expiry are assumed fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        match serde_json::from_str(&fs::read_to_string(path)?) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write the token atomically, readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

pub struct Authenticator {
    client: Client,
    credentials_file: PathBuf,
    token_file: PathBuf,
}

impl Authenticator {
    pub fn new(credentials_file: PathBuf, token_file: PathBuf) -> Self {
        Self::new_with_client(credentials_file, token_file, Client::new())
    }

    pub fn new_with_client(credentials_file: PathBuf, token_file: PathBuf, client: Client) -> Self {
        Self {
            client,
            credentials_file,
            token_file,
        }
    }

    /// Produce a usable token: cached, refreshed, or freshly consented.
    pub async fn authorize(&self) -> Result<StoredToken> {
        if let Some(token) = StoredToken::load(&self.token_file)? {
            if token.is_fresh(Utc::now()) {
                tracing::debug!("Reusing cached token from {}", self.token_file.display());
                return Ok(token);
            }
            if token.refresh_token.is_some() {
                return self.refresh(&token).await;
            }
        }

        let secrets = ClientSecrets::load(&self.credentials_file)?;
        let token = self.run_consent_flow(&secrets).await?;
        token.save(&self.token_file)?;
        tracing::info!("Saved new token to {}", self.token_file.display());
        Ok(token)
    }

    /// Exchange the refresh token for a new access token and cache it.
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| Error::Auth("Token expired and has no refresh token".to_string()))?;
        let secrets = ClientSecrets::load(&self.credentials_file)?;

        tracing::info!("Refreshing expired access token");
        let response = self
            .request_token(
                &secrets.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                ],
            )
            .await?;

        let refreshed = response.into_token(Some(refresh_token));
        refreshed.save(&self.token_file)?;
        Ok(refreshed)
    }

    pub fn authorization_url(secrets: &ClientSecrets) -> Result<Url> {
        Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", secrets.redirect_uri()),
                ("response_type", "code"),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| Error::Auth(format!("Invalid auth_uri '{}': {}", secrets.auth_uri, e)))
    }

    async fn run_consent_flow(&self, secrets: &ClientSecrets) -> Result<StoredToken> {
        let url = Self::authorization_url(secrets)?;
        println!("Open this URL in a browser to authorize access to Google Drive:\n\n{}\n", url);
        println!("After approving, paste the code (or the full redirected URL) here:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        let code = extract_code(&line)
            .ok_or_else(|| Error::Auth("No authorization code entered".to_string()))?;

        let response = self
            .request_token(
                &secrets.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", secrets.redirect_uri()),
                ],
            )
            .await?;

        tracing::info!("Successfully authenticated with Google Drive");
        Ok(response.into_token(None))
    }

    async fn request_token(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.client.post(token_uri).form(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Token endpoint error (status {}): {}", status, error_text);
            return Err(Error::Auth(format!(
                "Token request failed (status {}): {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

/// Accept either a bare code or a redirect URL carrying `?code=...`.
fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}
