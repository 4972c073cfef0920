use metrix_common::types::{MetricKind, MetricValue, ModelError, Record};
use metrix_storage::{Storage, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad name, kind or value. Nothing was stored.
    #[error(transparent)]
    Invalid(#[from] ModelError),

    #[error("metric {kind} '{name}' not found")]
    NotFound { name: String, kind: MetricKind },

    #[error("{0} is not supported by the configured storage")]
    NotSupported(&'static str),

    #[error("storage ping timed out")]
    Timeout,

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotSupported(what) => ServiceError::NotSupported(what),
            other => ServiceError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Merges pushed measurements into storage.
///
/// Counters accumulate: the stored value is the sum of every delta merged
/// into it. Gauges overwrite: the stored value is the latest reading.
///
/// Counter merges read the stored baseline and write the sum back; they run
/// under one merge lock so concurrent requests cannot lose deltas.
#[derive(Clone)]
pub struct MetricService {
    storage: Arc<dyn Storage>,
    merge_lock: Arc<Mutex<()>>,
}

impl MetricService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            merge_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Parses `kind` and `raw` and merges the result under `name`.
    pub async fn push(&self, name: &str, kind: &str, raw: &str) -> Result<Record> {
        let kind: MetricKind = kind.parse()?;
        let value = MetricValue::parse(kind, raw)?;
        self.push_record(Record::new(name, value)?).await
    }

    /// Merges a typed record and returns what was stored.
    pub async fn push_record(&self, record: Record) -> Result<Record> {
        let MetricValue::Counter(delta) = record.value() else {
            self.storage.push(record.name(), record.clone()).await?;
            return Ok(record);
        };

        let _merge = self.merge_lock.lock().await;
        let base = self.counter_baseline(record.name()).await?;
        let total = add_delta(record.name(), base, delta)?;
        let stored = record.with_value(MetricValue::Counter(total));
        self.storage.push(stored.name(), stored.clone()).await?;
        Ok(stored)
    }

    /// Adds `delta` to the stored counter and returns the new total.
    pub async fn push_counter(&self, name: &str, delta: i64) -> Result<i64> {
        let stored = self.push_record(Record::counter(name, delta)?).await?;
        Ok(stored.value().as_counter().unwrap_or(delta))
    }

    pub async fn push_gauge(&self, name: &str, value: f64) -> Result<f64> {
        self.push_record(Record::gauge(name, value)?).await?;
        Ok(value)
    }

    /// Merges a whole batch with a single storage write.
    ///
    /// Records are applied in order. Each name reaches storage once: repeated
    /// gauges keep the last value, repeated counters add every delta to the
    /// baseline read on the name's first occurrence.
    pub async fn push_batch(&self, records: Vec<Record>) -> Result<()> {
        let mut merged: Vec<Record> = Vec::with_capacity(records.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut totals: HashMap<String, i64> = HashMap::new();

        let _merge = self.merge_lock.lock().await;
        for record in records {
            let name = record.name().to_string();
            let record = match record.value() {
                MetricValue::Gauge(_) => record,
                MetricValue::Counter(delta) => {
                    let base = match totals.get(&name) {
                        Some(total) => *total,
                        None => self.counter_baseline(&name).await?,
                    };
                    let total = add_delta(&name, base, delta)?;
                    totals.insert(name.clone(), total);
                    record.with_value(MetricValue::Counter(total))
                }
            };

            match index.get(&name) {
                Some(&i) => merged[i] = record,
                None => {
                    index.insert(name, merged.len());
                    merged.push(record);
                }
            }
        }

        tracing::debug!(records = merged.len(), "Merging batch");
        self.storage.push_batch(merged).await?;
        Ok(())
    }

    /// Looks up `name`; a record of another kind counts as missing.
    pub async fn get(&self, name: &str, kind: MetricKind) -> Result<Record> {
        let not_found = || ServiceError::NotFound {
            name: name.to_string(),
            kind,
        };
        match self.storage.get(name).await {
            Ok(record) if record.kind() == kind => Ok(record),
            Ok(_) => Err(not_found()),
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!(name = %name, error = %e, "Metric lookup failed");
                }
                Err(not_found())
            }
        }
    }

    /// Every stored record. Storage failures yield an empty list.
    pub async fn get_all(&self) -> Vec<Record> {
        match self.storage.get_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Listing metrics failed, returning empty set");
                Vec::new()
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match tokio::time::timeout(PING_TIMEOUT, metrix_storage::ping(self.storage.as_ref())).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        }
    }

    /// Stored counter value for `name`, zero when absent or of another kind.
    async fn counter_baseline(&self, name: &str) -> Result<i64> {
        match self.storage.get(name).await {
            Ok(record) => Ok(record.value().as_counter().unwrap_or(0)),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

fn add_delta(name: &str, base: i64, delta: i64) -> Result<i64> {
    base.checked_add(delta)
        .ok_or_else(|| ModelError::CounterOverflow(name.to_string()).into())
}
