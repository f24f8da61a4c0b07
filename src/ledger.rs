//! Durable record of converted remote files
//!
//! The ledger is keyed by remote id, so renaming or moving an output file
//! never causes a source to be converted twice. When backed by a file, every
//! insertion is written through a temp file and atomically renamed into
//! place; a record only becomes visible once it is on disk.

use crate::models::ConversionRecord;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    records: Vec<ConversionRecord>,
}

pub struct ConversionLedger {
    records: Vec<ConversionRecord>,
    index: HashMap<String, usize>,
    path: Option<PathBuf>,
}

impl ConversionLedger {
    /// A ledger that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            path: None,
        }
    }

    /// Open (or start) a ledger persisted as JSON at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut ledger = Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory()
        };

        if !path.exists() {
            tracing::info!("No ledger at {}, starting fresh", path.display());
            return Ok(ledger);
        }

        let file: LedgerFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        for record in file.records {
            if ledger.index.contains_key(&record.remote_id) {
                return Err(Error::DuplicateRecord(record.remote_id));
            }
            ledger
                .index
                .insert(record.remote_id.clone(), ledger.records.len());
            ledger.records.push(record);
        }

        tracing::info!(
            "Loaded {} conversion records from {}",
            ledger.records.len(),
            path.display()
        );
        Ok(ledger)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has(&self, remote_id: &str) -> bool {
        self.index.contains_key(remote_id)
    }

    pub fn get(&self, remote_id: &str) -> Option<&ConversionRecord> {
        self.index.get(remote_id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if some record other than `remote_id`'s already claims `output_path`.
    pub fn output_claimed(&self, output_path: &Path, remote_id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.output_path == output_path && r.remote_id != remote_id)
    }

    /// Insert a new record and persist it.
    ///
    /// Fails with [`Error::DuplicateRecord`] if `remote_id` is already present.
    /// If persisting fails the record is rolled back and the error returned.
    pub fn record(
        &mut self,
        remote_id: &str,
        output_path: &Path,
        original_bytes: u64,
        converted_bytes: u64,
    ) -> Result<ConversionRecord> {
        if self.has(remote_id) {
            return Err(Error::DuplicateRecord(remote_id.to_string()));
        }
        if converted_bytes == 0 {
            return Err(Error::Invariant(format!(
                "refusing zero-byte conversion record for {}",
                remote_id
            )));
        }

        let record = ConversionRecord {
            remote_id: remote_id.to_string(),
            output_path: output_path.to_path_buf(),
            original_bytes,
            converted_bytes,
            converted_at: Utc::now(),
        };

        self.index.insert(record.remote_id.clone(), self.records.len());
        self.records.push(record.clone());

        if let Err(e) = self.save() {
            self.records.pop();
            self.index.remove(remote_id);
            return Err(e);
        }

        Ok(record)
    }

    /// All records, oldest conversion first.
    pub fn all(&self) -> Vec<ConversionRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.converted_at);
        records
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(&LedgerFile {
            records: self.records.clone(),
        })?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_has() {
        let mut ledger = ConversionLedger::in_memory();
        assert!(!ledger.has("f1"));

        let record = ledger
            .record("f1", Path::new("converted/a.jpg"), 2_000_000, 400_000)
            .unwrap();

        assert!(ledger.has("f1"));
        assert_eq!(record.remote_id, "f1");
        assert_eq!(record.output_path, PathBuf::from("converted/a.jpg"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_duplicate_record_rejected() {
        let mut ledger = ConversionLedger::in_memory();
        ledger.record("f1", Path::new("a.jpg"), 10, 5).unwrap();

        let err = ledger.record("f1", Path::new("b.jpg"), 10, 5).unwrap_err();
        assert!(matches!(err, Error::DuplicateRecord(id) if id == "f1"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("f1").unwrap().output_path, PathBuf::from("a.jpg"));
    }

    #[test]
    fn test_zero_byte_record_rejected() {
        let mut ledger = ConversionLedger::in_memory();
        assert!(ledger.record("f1", Path::new("a.jpg"), 10, 0).is_err());
        assert!(!ledger.has("f1"));
    }

    #[test]
    fn test_all_is_ordered_by_conversion_time() {
        let mut ledger = ConversionLedger::in_memory();
        ledger.record("b", Path::new("b.jpg"), 10, 5).unwrap();
        ledger.record("a", Path::new("a.jpg"), 10, 5).unwrap();
        ledger.record("c", Path::new("c.jpg"), 10, 5).unwrap();

        let all = ledger.all();
        assert!(all.windows(2).all(|w| w[0].converted_at <= w[1].converted_at));
        let ids: Vec<&str> = all.iter().map(|r| r.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_output_claimed_by_other_remote_id() {
        let mut ledger = ConversionLedger::in_memory();
        ledger.record("f1", Path::new("out/a.jpg"), 10, 5).unwrap();

        assert!(ledger.output_claimed(Path::new("out/a.jpg"), "f2"));
        assert!(!ledger.output_claimed(Path::new("out/a.jpg"), "f1"));
        assert!(!ledger.output_claimed(Path::new("out/b.jpg"), "f2"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.json");

        {
            let mut ledger = ConversionLedger::open(&path).unwrap();
            assert!(ledger.is_empty());
            ledger.record("f1", Path::new("a.jpg"), 100, 40).unwrap();
            ledger.record("f2", Path::new("b.jpg"), 200, 80).unwrap();
        }

        let reopened = ConversionLedger::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.has("f1"));
        assert!(reopened.has("f2"));
        assert_eq!(reopened.get("f2").unwrap().converted_bytes, 80);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_rejects_duplicate_ids_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let record = ConversionRecord {
            remote_id: "f1".to_string(),
            output_path: PathBuf::from("a.jpg"),
            original_bytes: 10,
            converted_bytes: 5,
            converted_at: Utc::now(),
        };
        let file = LedgerFile {
            records: vec![record.clone(), record],
        };
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        assert!(matches!(
            ConversionLedger::open(&path),
            Err(Error::DuplicateRecord(_))
        ));
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempdir().unwrap();
        // A directory where the ledger file should be makes the rename fail
        let path = dir.path().join("ledger.json");
        fs::create_dir_all(&path).unwrap();

        let mut ledger = ConversionLedger {
            path: Some(path),
            ..ConversionLedger::in_memory()
        };

        assert!(ledger.record("f1", Path::new("a.jpg"), 10, 5).is_err());
        assert!(!ledger.has("f1"));
        assert!(ledger.is_empty());
    }
}
