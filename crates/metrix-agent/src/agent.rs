//! Poll and report loops.

use crate::dispatcher::{DispatchError, DispatchReport, Dispatcher};
use crate::flatten::{flatten, POLL_COUNT};
use metrix_collector::Sampler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Agent {
    sampler: Arc<Mutex<Sampler>>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    report_interval: Duration,
}

fn lock(sampler: &Mutex<Sampler>) -> MutexGuard<'_, Sampler> {
    sampler.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Agent {
    pub fn new(
        sampler: Sampler,
        dispatcher: Dispatcher,
        poll_interval: Duration,
        report_interval: Duration,
    ) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            dispatcher,
            poll_interval,
            report_interval,
        }
    }

    pub fn sampler(&self) -> Arc<Mutex<Sampler>> {
        Arc::clone(&self.sampler)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Samples once and dispatches the result.
    ///
    /// The polls carried by `PollCount` are acknowledged only when that item
    /// is known to have been delivered, so a lost increment is folded into
    /// the next cycle. The dispatcher is reset either way.
    pub async fn report_once(&mut self) -> Result<DispatchReport, DispatchError> {
        let snapshot = lock(&self.sampler).snapshot();
        let reported = snapshot.poll_count;

        let result = self.dispatcher.dispatch(flatten(&snapshot)).await;
        let poll_count_lost = match &result {
            Ok(_) => false,
            Err(e) => {
                !e.is_partial()
                    || e.lost_track()
                    || e.undelivered().any(|item| item.id == POLL_COUNT)
            }
        };
        if !poll_count_lost {
            lock(&self.sampler).acknowledge(reported);
        }
        self.dispatcher.reset();
        result
    }

    /// Runs both loops until `shutdown` fires, then closes the transport.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let poller = tokio::spawn(poll_loop(
            Arc::clone(&self.sampler),
            self.poll_interval,
            shutdown.clone(),
        ));

        let mut tick = interval(self.report_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first report
        // carries at least one poll.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.report_once() => log_cycle(&result),
                    }
                }
            }
        }

        if let Err(e) = poller.await {
            tracing::warn!(error = %e, "Poll loop ended abnormally");
        }
        if let Err(e) = self.dispatcher.close().await {
            tracing::warn!(error = %e, "Failed to close transport");
        }
        tracing::info!("Agent stopped");
    }
}

fn log_cycle(result: &Result<DispatchReport, DispatchError>) {
    match result {
        Ok(report) => tracing::info!(
            delivered = report.delivered,
            workers = report.workers,
            "Metrics reported"
        ),
        Err(e) if e.is_partial() => tracing::warn!(error = %e, "Metrics partially reported"),
        Err(e) => tracing::error!(error = %e, "Metrics report failed"),
    }
}

async fn poll_loop(sampler: Arc<Mutex<Sampler>>, every: Duration, shutdown: CancellationToken) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                let sampler = Arc::clone(&sampler);
                let polled = tokio::task::spawn_blocking(move || {
                    lock(&sampler).poll();
                })
                .await;
                if let Err(e) = polled {
                    tracing::warn!(error = %e, "Poll task failed");
                }
            }
        }
    }
    tracing::debug!("Poll loop stopped");
}
