//! Storage construction and snapshot persistence tasks.

use crate::config::Backend;
use anyhow::Context;
use metrix_storage::db::DbStorage;
use metrix_storage::file::FileStorage;
use metrix_storage::mem::MemStorage;
use metrix_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Opens the configured backend. File snapshots are loaded first when
/// `restore` is set.
pub async fn open(backend: &Backend, restore: bool) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match backend {
        Backend::Memory => Arc::new(MemStorage::new()),
        Backend::File { path, sync } => Arc::new(FileStorage::new(path.clone(), *sync)),
        Backend::Database { dsn } => Arc::new(
            DbStorage::connect(dsn)
                .await
                .context("connecting to metrics database")?,
        ),
    };

    if restore {
        if let Some(persistent) = storage.as_persistent() {
            persistent.load().await.context("restoring metrics snapshot")?;
            tracing::info!("Metrics snapshot restored");
        }
    }
    Ok(storage)
}

/// Saves a snapshot every `interval` until `token` is cancelled.
///
/// Returns `None` when the backend cannot persist or saves happen on every
/// push already.
pub fn spawn_saver(
    storage: Arc<dyn Storage>,
    interval: Duration,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() || storage.as_persistent().is_none() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    if let Some(persistent) = storage.as_persistent() {
                        match persistent.save().await {
                            Ok(()) => tracing::debug!("Metrics snapshot saved"),
                            Err(e) => tracing::error!(error = %e, "Periodic snapshot save failed"),
                        }
                    }
                }
            }
        }
    }))
}

/// Final save and close, run once the listeners have stopped.
pub async fn shutdown(storage: &dyn Storage) {
    if let Some(persistent) = storage.as_persistent() {
        match persistent.save().await {
            Ok(()) => tracing::info!("Metrics snapshot saved on shutdown"),
            Err(e) => tracing::error!(error = %e, "Final snapshot save failed"),
        }
    }
    if let Err(e) = storage.close().await {
        tracing::error!(error = %e, "Closing storage failed");
    }
}
