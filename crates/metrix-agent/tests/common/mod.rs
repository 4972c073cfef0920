#![allow(dead_code)]

use async_trait::async_trait;
use metrix_agent::transport::{Transport, TransportError};
use metrix_common::types::RequestMetric;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every batch it is given; fails batches containing a poisoned id.
#[derive(Default)]
pub struct RecordingTransport {
    pub batches: Mutex<Vec<Vec<RequestMetric>>>,
    pub poisoned: Mutex<HashSet<String>>,
    pub fail_all: AtomicBool,
    pub panic_on_send: AtomicBool,
    pub closed: AtomicBool,
    pub delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&self, id: &str) {
        self.poisoned.lock().unwrap().insert(id.to_string());
    }

    pub fn batches(&self) -> Vec<Vec<RequestMetric>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<RequestMetric> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_batch(&self, batch: &[RequestMetric]) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.panic_on_send.load(Ordering::SeqCst) {
            panic!("transport blew up");
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(TransportError::Status(500));
        }
        let poisoned = {
            let poisoned = self.poisoned.lock().unwrap();
            batch.iter().any(|item| poisoned.contains(&item.id))
        };
        if poisoned {
            return Err(TransportError::Status(503));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn items(n: usize) -> Vec<RequestMetric> {
    (0..n)
        .map(|i| RequestMetric::gauge(format!("g{i}"), i as f64))
        .collect()
}
