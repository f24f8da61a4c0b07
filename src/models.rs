//! Data models and structures
//!
//! Defines the remote file listing, conversion records and outcomes, the
//! immutable per-run options, and environment-driven configuration.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const HEIC_EXTENSIONS: [&str; 2] = ["heic", "heif"];
pub const HEIC_MIME_TYPES: [&str; 2] = ["image/heic", "image/heif"];

/// A file as listed by the remote store. Re-listed on every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub container_id: Option<String>,
}

impl RemoteFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size_bytes,
            mime_type: None,
            container_id: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// True when the name extension or the declared content type marks a HEIC source.
    pub fn is_heic(&self) -> bool {
        let by_extension = Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                HEIC_EXTENSIONS
                    .iter()
                    .any(|heic| ext.eq_ignore_ascii_case(heic))
            })
            .unwrap_or(false);

        let by_mime = self
            .mime_type
            .as_deref()
            .map(|mime| {
                HEIC_MIME_TYPES
                    .iter()
                    .any(|heic| mime.eq_ignore_ascii_case(heic))
            })
            .unwrap_or(false);

        by_extension || by_mime
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionRecord {
    pub remote_id: String,
    pub output_path: PathBuf,
    pub original_bytes: u64,
    pub converted_bytes: u64,
    pub converted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyConverted,
    NotHeic,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyConverted => write!(f, "already_converted"),
            SkipReason::NotHeic => write!(f, "not_heic"),
        }
    }
}

/// Classification of a per-file failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    #[serde(rename = "fetch_error")]
    Fetch,
    #[serde(rename = "decode_error")]
    Decode,
    #[serde(rename = "encode_error")]
    Encode,
    #[serde(rename = "write_error")]
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fetch => write!(f, "fetch_error"),
            FailureKind::Decode => write!(f, "decode_error"),
            FailureKind::Encode => write!(f, "encode_error"),
            FailureKind::Write => write!(f, "write_error"),
        }
    }
}

/// Terminal state of one candidate file in one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Converted(ConversionRecord),
    Skipped {
        remote_id: String,
        name: String,
        reason: SkipReason,
    },
    Failed {
        remote_id: String,
        name: String,
        kind: FailureKind,
        message: String,
    },
}

impl ConversionOutcome {
    pub fn remote_id(&self) -> &str {
        match self {
            ConversionOutcome::Converted(record) => &record.remote_id,
            ConversionOutcome::Skipped { remote_id, .. } => remote_id,
            ConversionOutcome::Failed { remote_id, .. } => remote_id,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted(_))
    }
}

/// Validated, immutable settings for a single pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    quality: u8,
    max_width: u32,
    max_height: u32,
    output_dir: PathBuf,
    container_filter: Option<String>,
}

impl ConversionOptions {
    pub fn new(
        quality: u32,
        max_width: u32,
        max_height: u32,
        output_dir: impl Into<PathBuf>,
        container_filter: Option<String>,
    ) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(Error::InvalidOptions(format!(
                "quality must be between 1 and 100, got {}",
                quality
            )));
        }
        if max_width == 0 || max_height == 0 {
            return Err(Error::InvalidOptions(format!(
                "maximum dimensions must be positive, got {}x{}",
                max_width, max_height
            )));
        }

        Ok(Self {
            quality: quality as u8,
            max_width,
            max_height,
            output_dir: output_dir.into(),
            container_filter: container_filter.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn container_filter(&self) -> Option<&str> {
        self.container_filter.as_deref()
    }
}

// Configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub default_quality: u32,
    pub default_max_width: u32,
    pub default_max_height: u32,
    pub default_output_dir: PathBuf,
    pub ledger_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_str = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let get_int = |key: &str, default: u32| match lookup(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("{}={:?} is not a valid number, using {}", key, raw, default);
                default
            }),
            None => default,
        };

        Self {
            credentials_file: PathBuf::from(get_str("GOOGLE_CREDENTIALS_FILE", "credentials.json")),
            token_file: PathBuf::from(get_str("GOOGLE_TOKEN_FILE", "token.json")),
            default_quality: get_int("DEFAULT_QUALITY", 85),
            default_max_width: get_int("DEFAULT_MAX_WIDTH", 1920),
            default_max_height: get_int("DEFAULT_MAX_HEIGHT", 1080),
            default_output_dir: PathBuf::from(get_str("DEFAULT_OUTPUT_DIR", "converted")),
            ledger_file: lookup("CONVERSION_LEDGER_FILE").map(PathBuf::from),
        }
    }

    /// Ledger location, defaulting to a hidden file inside the output directory.
    pub fn ledger_path(&self, output_dir: &Path) -> PathBuf {
        self.ledger_file
            .clone()
            .unwrap_or_else(|| output_dir.join(".heic2jpg-ledger.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_heic_detection_by_extension() {
        assert!(RemoteFile::new("1", "IMG_0001.heic", 10).is_heic());
        assert!(RemoteFile::new("2", "IMG_0002.HEIC", 10).is_heic());
        assert!(RemoteFile::new("3", "burst.heif", 10).is_heic());
        assert!(!RemoteFile::new("4", "notes.txt", 10).is_heic());
        assert!(!RemoteFile::new("5", "heic", 10).is_heic());
    }

    #[test]
    fn test_heic_detection_by_mime_type() {
        let file = RemoteFile::new("1", "untitled", 10).with_mime_type("image/heic");
        assert!(file.is_heic());

        let file = RemoteFile::new("2", "untitled", 10).with_mime_type("image/png");
        assert!(!file.is_heic());
    }

    #[test]
    fn test_options_reject_out_of_range_quality() {
        assert!(ConversionOptions::new(0, 1920, 1080, "out", None).is_err());
        assert!(ConversionOptions::new(101, 1920, 1080, "out", None).is_err());
        assert!(ConversionOptions::new(1, 1920, 1080, "out", None).is_ok());
        assert!(ConversionOptions::new(100, 1920, 1080, "out", None).is_ok());
    }

    #[test]
    fn test_options_reject_zero_bounds() {
        let err = ConversionOptions::new(85, 0, 1080, "out", None).unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_options_ignore_blank_container() {
        let options = ConversionOptions::new(85, 1920, 1080, "out", Some("  ".to_string())).unwrap();
        assert_eq!(options.container_filter(), None);
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_string(&FailureKind::Fetch).unwrap();
        assert_eq!(json, "\"fetch_error\"");
        assert_eq!(FailureKind::Write.to_string(), "write_error");
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = ConversionOutcome::Skipped {
            remote_id: "f1".to_string(),
            name: "a.heic".to_string(),
            reason: SkipReason::AlreadyConverted,
        };

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"skipped\""));
        assert!(json.contains("\"reason\":\"already_converted\""));
        assert_eq!(outcome.remote_id(), "f1");
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_vars(|_| None);

        assert_eq!(config.credentials_file, PathBuf::from("credentials.json"));
        assert_eq!(config.token_file, PathBuf::from("token.json"));
        assert_eq!(config.default_quality, 85);
        assert_eq!(config.default_max_width, 1920);
        assert_eq!(config.default_max_height, 1080);
        assert_eq!(config.default_output_dir, PathBuf::from("converted"));
        assert_eq!(
            config.ledger_path(Path::new("converted")),
            PathBuf::from("converted/.heic2jpg-ledger.json")
        );
    }

    #[test]
    fn test_config_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("GOOGLE_CREDENTIALS_FILE", "test_credentials.json"),
            ("GOOGLE_TOKEN_FILE", "test_token.json"),
            ("DEFAULT_QUALITY", "90"),
            ("DEFAULT_MAX_WIDTH", "1600"),
            ("DEFAULT_MAX_HEIGHT", "900"),
            ("DEFAULT_OUTPUT_DIR", "test_output"),
            ("CONVERSION_LEDGER_FILE", "/var/lib/ledger.json"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.credentials_file, PathBuf::from("test_credentials.json"));
        assert_eq!(config.token_file, PathBuf::from("test_token.json"));
        assert_eq!(config.default_quality, 90);
        assert_eq!(config.default_max_width, 1600);
        assert_eq!(config.default_max_height, 900);
        assert_eq!(config.default_output_dir, PathBuf::from("test_output"));
        assert_eq!(
            config.ledger_path(Path::new("test_output")),
            PathBuf::from("/var/lib/ledger.json")
        );
    }

    #[test]
    fn test_config_invalid_number_falls_back_to_default() {
        let config = Config::from_vars(|key| match key {
            "DEFAULT_QUALITY" => Some("not_a_number".to_string()),
            _ => None,
        });

        assert_eq!(config.default_quality, 85);
    }
}
