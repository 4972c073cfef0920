use crate::mem::MemStorage;
use crate::{Persistent, Result, Storage, StorageError};
use async_trait::async_trait;
use metrix_common::types::Record;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// In-memory records snapshotted to a JSON file.
///
/// The file holds one object mapping each name to its record. In
/// synchronous mode every push is followed by a save; otherwise the owner
/// is expected to call [`Persistent::save`] periodically.
#[derive(Debug)]
pub struct FileStorage {
    inner: MemStorage,
    path: PathBuf,
    sync_mode: bool,
    save_lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>, sync_mode: bool) -> Self {
        Self {
            inner: MemStorage::new(),
            path: path.into(),
            sync_mode,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_sync(&self) -> bool {
        self.sync_mode
    }

    async fn after_write(&self) -> Result<()> {
        if self.sync_mode {
            self.save().await?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn push(&self, name: &str, record: Record) -> Result<()> {
        self.inner.insert(name, record);
        self.after_write().await
    }

    async fn push_batch(&self, records: Vec<Record>) -> Result<()> {
        self.inner.insert_all(records);
        self.after_write().await
    }

    async fn get(&self, name: &str) -> Result<Record> {
        self.inner.lookup(name)
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        Ok(self.inner.values())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_persistent(&self) -> Option<&dyn Persistent> {
        Some(self)
    }
}

#[async_trait]
impl Persistent for FileStorage {
    /// Writes the full snapshot to a sibling temp file, then renames it over
    /// the target so readers never observe a partial file.
    async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.inner.snapshot();
        let data = serde_json::to_vec(&*snapshot.by_name())?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), records = snapshot.len(), "Saved snapshot");
        Ok(())
    }

    /// Loads the snapshot file into memory. A missing file is a cold start.
    async fn load(&self) -> Result<()> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No snapshot file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let records: HashMap<String, Record> = serde_json::from_slice(&data)?;
        if let Some((key, record)) = records.iter().find(|(key, r)| r.name() != key.as_str()) {
            return Err(StorageError::Corrupt {
                name: key.clone(),
                reason: format!("snapshot entry holds record '{}'", record.name()),
            });
        }
        tracing::info!(path = %self.path.display(), records = records.len(), "Restored snapshot");
        self.inner.insert_all(records.into_values().collect());
        Ok(())
    }
}
