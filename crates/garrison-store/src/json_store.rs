//! ---
//! gsn_section: "02-fleet-data"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Fleet records and configuration-store bindings."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Configuration-store collaborator: trait contract plus the shipped
//! JSON-file-backed implementation (one document per server name).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::records::ServerRecord;
use crate::Result;

/// External key-value persistence for server records, keyed by server
/// name. Treated as the source of truth; filesystem scanning is only a
/// fallback for entries the store never saw.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Insert or replace the record stored under `name`.
    async fn upsert(&self, name: &str, record: &ServerRecord) -> Result<()>;
    /// Every record the store knows about.
    async fn get_all(&self) -> Result<Vec<ServerRecord>>;
    /// One record, `None` when the key is unknown.
    async fn get_one(&self, name: &str) -> Result<Option<ServerRecord>>;
    /// Remove the record stored under `name`. Unknown keys are not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Store implementation writing one pretty-printed JSON document per
/// server under a records directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created lazily
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Records directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn upsert(&self, name: &str, record: &ServerRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.record_path(name);
        let serialized = serde_json::to_vec_pretty(record)?;
        fs::write(&path, serialized).await?;
        debug!(server = %name, path = %path.display(), "record persisted");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ServerRecord>> {
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read(&path).await?;
            let record: ServerRecord = serde_json::from_slice(&raw)?;
            records.push(record);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn get_one(&self, name: &str) -> Result<Option<ServerRecord>> {
        let path = self.record_path(name);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.record_path(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(server = %name, "record deleted");
                Ok(())
            }
            // Deleting an absent record is fine; everything else is not.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PortTriple;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upsert_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let record = ServerRecord::new("alpha-01", PortTriple::from_game(7777));

        store.upsert("alpha-01", &record).await.unwrap();
        let loaded = store.get_one("alpha-01").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        store.delete("alpha-01").await.unwrap();
        assert!(store.get_one("alpha-01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_returns_sorted_records() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        for name in ["bravo", "alpha", "charlie"] {
            let record = ServerRecord::new(name, PortTriple::from_game(7777));
            store.upsert(name, &record).await.unwrap();
        }
        let all = store.get_all().await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_record() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn get_all_on_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("not-created-yet"));
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
