use crate::{Result, Storage, StorageError};
use async_trait::async_trait;
use metrix_common::types::Record;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutex-guarded name → record map without persistence.
#[derive(Debug, Default)]
pub struct MemStorage {
    records: Mutex<HashMap<String, Record>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deep copy with its own lock, for iterating without blocking writers.
    pub fn snapshot(&self) -> MemStorage {
        MemStorage {
            records: Mutex::new(self.lock().clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Locked view of the map; held until the guard drops.
    pub(crate) fn by_name(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.lock()
    }

    pub(crate) fn insert(&self, name: &str, record: Record) {
        self.lock().insert(name.to_string(), record);
    }

    pub(crate) fn insert_all(&self, records: Vec<Record>) {
        let mut map = self.lock();
        for record in records {
            map.insert(record.name().to_string(), record);
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Record> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    pub(crate) fn values(&self) -> Vec<Record> {
        self.lock().values().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn push(&self, name: &str, record: Record) -> Result<()> {
        self.insert(name, record);
        Ok(())
    }

    async fn push_batch(&self, records: Vec<Record>) -> Result<()> {
        self.insert_all(records);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Record> {
        self.lookup(name)
    }

    async fn get_all(&self) -> Result<Vec<Record>> {
        Ok(self.values())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
