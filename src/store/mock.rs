use super::RemoteFileStore;
use crate::models::{RemoteFile, HEIC_MIME_TYPES};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory remote store with scriptable fetch failures.
#[derive(Clone)]
pub struct MockRemoteStore {
    files: Arc<Mutex<Vec<RemoteFile>>>,
    contents: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failing_fetches: Arc<Mutex<HashSet<String>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    fail_listing: Arc<Mutex<bool>>,
    fetch_count: Arc<Mutex<usize>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(Vec::new())),
            contents: Arc::new(Mutex::new(HashMap::new())),
            failing_fetches: Arc::new(Mutex::new(HashSet::new())),
            failing_deletes: Arc::new(Mutex::new(HashSet::new())),
            fail_listing: Arc::new(Mutex::new(false)),
            fetch_count: Arc::new(Mutex::new(0)),
            deleted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_file(self, file: RemoteFile, content: Vec<u8>) -> Self {
        self.contents
            .lock()
            .unwrap()
            .insert(file.id.clone(), content);
        self.files.lock().unwrap().push(file);
        self
    }

    /// Make every fetch of `remote_id` fail as a network error would.
    pub fn with_fetch_failure(self, remote_id: &str) -> Self {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
        self
    }

    pub fn with_delete_failure(self, remote_id: &str) -> Self {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(remote_id.to_string());
        self
    }

    pub fn with_listing_failure(self, should_fail: bool) -> Self {
        *self.fail_listing.lock().unwrap() = should_fail;
        self
    }

    pub fn get_fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }

    pub fn get_deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteFileStore for MockRemoteStore {
    async fn list(
        &self,
        container_id: Option<&str>,
        name_filters: &[&str],
    ) -> Result<Vec<RemoteFile>> {
        if *self.fail_listing.lock().unwrap() {
            return Err(Error::RemoteStore("Mock listing failure".to_string()));
        }

        // Same matching as the Drive query: name substring or declared MIME type
        let filters: Vec<String> = name_filters.iter().map(|f| f.to_lowercase()).collect();
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|f| container_id.is_none() || f.container_id.as_deref() == container_id)
            .filter(|f| {
                let name = f.name.to_lowercase();
                filters.iter().any(|filter| name.contains(filter.as_str()))
                    || f.mime_type
                        .as_deref()
                        .is_some_and(|mime| HEIC_MIME_TYPES.contains(&mime))
            })
            .cloned()
            .collect())
    }

    async fn fetch(&self, remote_id: &str) -> Result<Vec<u8>> {
        *self.fetch_count.lock().unwrap() += 1;

        if self.failing_fetches.lock().unwrap().contains(remote_id) {
            return Err(Error::RemoteStore(format!(
                "Mock network error fetching {}",
                remote_id
            )));
        }

        self.contents
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .ok_or_else(|| Error::RemoteStore(format!("File not found: {}", remote_id)))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(remote_id) {
            return Err(Error::RemoteStore(format!(
                "Mock permission error deleting {}",
                remote_id
            )));
        }

        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|f| f.id != remote_id);
        if files.len() == before {
            return Err(Error::RemoteStore(format!("File not found: {}", remote_id)));
        }

        self.contents.lock().unwrap().remove(remote_id);
        self.deleted.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_list_filters_by_container_and_name() {
        let store = MockRemoteStore::new()
            .with_file(RemoteFile::new("f1", "a.heic", 10).with_container("trip"), vec![1])
            .with_file(RemoteFile::new("f2", "b.HEIC", 10).with_container("home"), vec![2])
            .with_file(RemoteFile::new("f3", "c.png", 10).with_container("trip"), vec![3])
            .with_file(RemoteFile::new("f4", "d.heif", 10).with_container("home"), vec![4]);

        let heic_only = store.list(None, &[".heic"]).await.unwrap();
        assert_eq!(heic_only.len(), 2);

        let all = store.list(None, &[".heic", ".heif"]).await.unwrap();
        assert_eq!(all.len(), 3);

        let trip = store.list(Some("trip"), &[".heic", ".heif"]).await.unwrap();
        assert_eq!(trip.len(), 1);
        assert_eq!(trip[0].id, "f1");
    }

    #[tokio::test]
    async fn test_mock_fetch_and_failure() {
        let store = MockRemoteStore::new()
            .with_file(RemoteFile::new("f1", "a.heic", 3), vec![1, 2, 3])
            .with_file(RemoteFile::new("f2", "b.heic", 3), vec![4, 5, 6])
            .with_fetch_failure("f2");

        assert_eq!(store.fetch("f1").await.unwrap(), vec![1, 2, 3]);
        assert!(store.fetch("f2").await.is_err());
        assert!(store.fetch("missing").await.is_err());
        assert_eq!(store.get_fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_delete() {
        let store = MockRemoteStore::new().with_file(RemoteFile::new("f1", "a.heic", 3), vec![1]);

        store.delete("f1").await.unwrap();
        assert!(store.delete("f1").await.is_err());
        assert_eq!(store.get_deleted(), vec!["f1".to_string()]);
        assert!(store.list(None, &[".heic"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_delete_failure_keeps_file() {
        let store = MockRemoteStore::new()
            .with_file(RemoteFile::new("f1", "a.heic", 3), vec![1])
            .with_delete_failure("f1");

        assert!(store.delete("f1").await.is_err());
        assert!(store.get_deleted().is_empty());
        assert_eq!(store.list(None, &[".heic"]).await.unwrap().len(), 1);
    }
}
