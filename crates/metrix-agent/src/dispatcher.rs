//! Report-cycle dispatch: a bounded queue drained by competing senders.
//!
//! Each cycle spawns `rate_limit` workers on one queue. Every worker drains
//! the queue until it is closed, then sends whatever it collected as one
//! sub-batch. How items split across workers is up to the scheduler; with a
//! single worker the whole cycle goes out as one batch.
//!
//! Outcomes are collected per worker through the join handles, so a cycle
//! reports every failed sub-batch rather than whichever failure landed last.

use crate::transport::{Transport, TransportError};
use kanal::{AsyncReceiver, AsyncSender};
use metrix_common::types::RequestMetric;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Fresh queue, ready for a cycle.
    Idle,
    /// Items are being enqueued.
    Collecting,
    /// Queue closed; workers are taking the last items.
    Draining,
    /// Workers are transmitting their sub-batches.
    Sending,
    /// Cycle finished; [`Dispatcher::reset`] is required before the next one.
    Done,
    Closed,
}

/// Summary of a cycle in which every sub-batch was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub workers: usize,
}

/// A worker whose sub-batch was not delivered.
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: usize,
    pub undelivered: Vec<RequestMetric>,
    pub error: TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Some sub-batches got through.
    Partial,
    /// Nothing got through.
    Total,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Partial => f.write_str("partial"),
            Delivery::Total => f.write_str("total"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher was not reset after the previous cycle")]
    NotReset,
    #[error("dispatch queue closed before all items were enqueued")]
    QueueClosed,
    #[error(
        "{delivery} failure: {failed} of {workers} senders failed, {delivered} items delivered",
        failed = .failures.len()
    )]
    Failed {
        delivery: Delivery,
        failures: Vec<WorkerFailure>,
        workers: usize,
        delivered: usize,
    },
}

impl DispatchError {
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            DispatchError::Failed {
                delivery: Delivery::Partial,
                ..
            }
        )
    }

    /// True when a sender died without handing back its sub-batch, so
    /// [`DispatchError::undelivered`] may be incomplete.
    pub fn lost_track(&self) -> bool {
        match self {
            DispatchError::Failed { failures, .. } => {
                failures.iter().any(|f| f.undelivered.is_empty())
            }
            _ => true,
        }
    }

    /// Items that did not reach the server in this cycle.
    pub fn undelivered(&self) -> impl Iterator<Item = &RequestMetric> {
        let failures: &[WorkerFailure] = match self {
            DispatchError::Failed { failures, .. } => failures,
            _ => &[],
        };
        failures.iter().flat_map(|f| f.undelivered.iter())
    }
}

struct WorkerOutcome {
    worker: usize,
    batch: Vec<RequestMetric>,
    result: Result<(), TransportError>,
}

type Queue = (AsyncSender<RequestMetric>, AsyncReceiver<RequestMetric>);

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    rate_limit: usize,
    capacity: usize,
    queue: Option<Queue>,
    state: DispatchState,
}

impl Dispatcher {
    /// `rate_limit` and `capacity` are clamped to at least one.
    pub fn new(transport: Arc<dyn Transport>, rate_limit: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            transport,
            rate_limit: rate_limit.max(1),
            capacity,
            queue: Some(kanal::bounded_async(capacity)),
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    /// Runs one cycle over `items`, in order.
    pub async fn dispatch(&mut self, items: Vec<RequestMetric>) -> Result<DispatchReport, DispatchError> {
        let (sender, receiver) = self.queue.take().ok_or(DispatchError::NotReset)?;

        let mut workers = JoinSet::new();
        for worker in 0..self.rate_limit {
            let queue = receiver.clone();
            let transport = Arc::clone(&self.transport);
            workers.spawn(async move {
                let mut batch = Vec::new();
                while let Ok(item) = queue.recv().await {
                    batch.push(item);
                }
                if batch.is_empty() {
                    return WorkerOutcome {
                        worker,
                        batch,
                        result: Ok(()),
                    };
                }
                // A panic in the transport must not take the batch with it.
                let batch = Arc::new(batch);
                let send = tokio::spawn({
                    let batch = Arc::clone(&batch);
                    async move { transport.send_batch(&batch).await }
                });
                let result = match send.await {
                    Ok(result) => result,
                    Err(e) => Err(TransportError::Aborted(e.to_string())),
                };
                WorkerOutcome {
                    worker,
                    batch: Arc::unwrap_or_clone(batch),
                    result,
                }
            });
        }
        drop(receiver);

        self.state = DispatchState::Collecting;
        for item in items {
            if sender.send(item).await.is_err() {
                self.state = DispatchState::Done;
                workers.abort_all();
                return Err(DispatchError::QueueClosed);
            }
        }
        drop(sender);
        self.state = DispatchState::Draining;

        let mut delivered = 0;
        let mut failures = Vec::new();
        let mut first = true;
        while let Some(joined) = workers.join_next().await {
            if first {
                self.state = DispatchState::Sending;
                first = false;
            }
            match joined {
                Ok(WorkerOutcome {
                    batch,
                    result: Ok(()),
                    ..
                }) => delivered += batch.len(),
                Ok(WorkerOutcome {
                    worker,
                    batch,
                    result: Err(error),
                }) => {
                    tracing::warn!(worker, items = batch.len(), error = %error, "Sub-batch not delivered");
                    failures.push(WorkerFailure {
                        worker,
                        undelivered: batch,
                        error,
                    });
                }
                Err(join_error) => {
                    // The worker's items are gone with it.
                    failures.push(WorkerFailure {
                        worker: usize::MAX,
                        undelivered: Vec::new(),
                        error: TransportError::Aborted(join_error.to_string()),
                    });
                }
            }
        }
        self.state = DispatchState::Done;

        if failures.is_empty() {
            return Ok(DispatchReport {
                delivered,
                workers: self.rate_limit,
            });
        }
        let delivery = if delivered > 0 {
            Delivery::Partial
        } else {
            Delivery::Total
        };
        Err(DispatchError::Failed {
            delivery,
            failures,
            workers: self.rate_limit,
            delivered,
        })
    }

    /// Replaces the queue for the next cycle.
    pub fn reset(&mut self) {
        if self.state == DispatchState::Closed {
            return;
        }
        self.queue = Some(kanal::bounded_async(self.capacity));
        self.state = DispatchState::Idle;
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.queue = None;
        self.state = DispatchState::Closed;
        self.transport.close().await
    }
}
