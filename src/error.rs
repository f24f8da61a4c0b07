//! Error handling and custom error types
//!
//! Provides unified error handling across the converter using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Duplicate record for remote id {0}")]
    DuplicateRecord(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Remote store error: {0}")]
    RemoteStore(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
