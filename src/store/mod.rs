//! Remote file repository access
//!
//! Lists candidate images, downloads their content, and removes originals
//! once they are no longer needed. Google Drive is the production backend.

pub mod auth;
pub mod drive;
pub mod mock;

pub use auth::{Authenticator, StoredToken};
pub use drive::DriveClient;
pub use mock::MockRemoteStore;

use crate::models::RemoteFile;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// List files whose name contains any of `name_filters` (any case) or
    /// whose content type is HEIC, optionally restricted to one container.
    async fn list(
        &self,
        container_id: Option<&str>,
        name_filters: &[&str],
    ) -> Result<Vec<RemoteFile>>;
    async fn fetch(&self, remote_id: &str) -> Result<Vec<u8>>;
    async fn delete(&self, remote_id: &str) -> Result<()>;
}
