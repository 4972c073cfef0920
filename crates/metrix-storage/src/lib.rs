//! Record storage for the metrix server.
//!
//! Every backend implements [`Storage`], a plain name-keyed upsert store:
//! the last write for a name replaces what was there. Kind-aware merging of
//! counters and gauges happens one layer up, in the server's metric service.
//!
//! Optional capabilities are discovered at runtime through
//! [`Storage::as_pinger`] and [`Storage::as_persistent`]:
//!
//! | Backend | Ping | Save/Load |
//! |---|---|---|
//! | [`mem::MemStorage`] | no | no |
//! | [`file::FileStorage`] | no | yes |
//! | [`db::DbStorage`] | yes | no |

pub mod db;
pub mod entities;
pub mod error;
pub mod file;
pub mod mem;


use async_trait::async_trait;
use metrix_common::types::Record;

pub use error::{Result, StorageError};

/// Name-keyed record store shared by all request handlers.
///
/// Implementations do their own locking; callers never synchronize access.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `record` under `name`, replacing any previous record.
    async fn push(&self, name: &str, record: Record) -> Result<()>;

    /// Stores every record under its own name. Later entries for the same
    /// name win.
    async fn push_batch(&self, records: Vec<Record>) -> Result<()>;

    /// Returns [`StorageError::NotFound`] when nothing is stored under `name`.
    async fn get(&self, name: &str) -> Result<Record>;

    /// All stored records, in no particular order.
    async fn get_all(&self) -> Result<Vec<Record>>;

    async fn close(&self) -> Result<()>;

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        None
    }

    fn as_persistent(&self) -> Option<&dyn Persistent> {
        None
    }
}

/// Liveness probe for backends behind a network connection.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Snapshot persistence for backends that keep records in memory.
#[async_trait]
pub trait Persistent: Send + Sync {
    async fn save(&self) -> Result<()>;
    async fn load(&self) -> Result<()>;
}

/// Pings `storage`, or fails with [`StorageError::NotSupported`].
pub async fn ping(storage: &dyn Storage) -> Result<()> {
    match storage.as_pinger() {
        Some(pinger) => pinger.ping().await,
        None => Err(StorageError::NotSupported("ping")),
    }
}
