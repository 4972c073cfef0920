//! Statistics sampling for the metrix agent.
//!
//! Each [`Collector`] refreshes one group of fields of a [`Snapshot`]
//! (process, memory, CPU, load). A [`Sampler`] runs them all on every poll
//! and maintains the two synthetic metrics: the `PollCount` counter and the
//! `RandomValue` gauge.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod process;

use anyhow::Result;

/// Statistics of the agent process itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessStats {
    pub resident_bytes: f64,
    pub virtual_bytes: f64,
    pub cpu_usage: f64,
    pub run_time_secs: f64,
    pub disk_read_bytes: f64,
    pub disk_written_bytes: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStats {
    pub total: f64,
    pub free: f64,
    pub available: f64,
    pub used: f64,
    pub swap_total: f64,
    pub swap_free: f64,
    pub swap_used: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStats {
    pub count: f64,
    pub global_usage: f64,
    /// Utilization per logical core, in core order.
    pub per_core: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadStats {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
    pub uptime_secs: f64,
}

/// One sample of everything the agent reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub process: ProcessStats,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    pub load: LoadStats,
    /// Polls since the last acknowledged report.
    pub poll_count: i64,
    pub random_value: f64,
}

/// Refreshes a group of [`Snapshot`] fields.
///
/// Collectors are owned by the [`Sampler`] and called on every poll, so they
/// may keep state (such as a `sysinfo::System`) between calls.
pub trait Collector: Send + Sync {
    /// Collector name, used in logs.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails. The
    /// snapshot keeps the previous values for this group.
    fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()>;
}

pub struct Sampler {
    collectors: Vec<Box<dyn Collector>>,
    snapshot: Snapshot,
}

impl Sampler {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        Self {
            collectors,
            snapshot: Snapshot::default(),
        }
    }

    /// Sampler with the process, memory, CPU and load collectors.
    pub fn with_default_collectors() -> Result<Self> {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(process::ProcessCollector::new()?),
            Box::new(memory::MemoryCollector::new()),
            Box::new(cpu::CpuCollector::new()),
            Box::new(load::LoadCollector::new()),
        ];
        Ok(Self::new(collectors))
    }

    /// Refreshes every group, bumps `PollCount` and draws a new `RandomValue`.
    pub fn poll(&mut self) {
        for collector in &mut self.collectors {
            if let Err(e) = collector.collect(&mut self.snapshot) {
                tracing::warn!(collector = collector.name(), error = %e, "Collection failed");
            }
        }
        self.snapshot.poll_count = self.snapshot.poll_count.saturating_add(1);
        self.snapshot.random_value = rand::random::<f64>();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Subtracts `reported` polls once a report carrying them succeeded.
    /// Polls taken while the report was in flight are kept.
    pub fn acknowledge(&mut self, reported: i64) {
        self.snapshot.poll_count = self.snapshot.poll_count.saturating_sub(reported).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Collector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()> {
            snapshot.memory.total = 1024.0;
            Ok(())
        }
    }

    struct Broken;

    impl Collector for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn collect(&mut self, _snapshot: &mut Snapshot) -> Result<()> {
            anyhow::bail!("no such device")
        }
    }

    #[test]
    fn poll_counts_and_randomizes() {
        let collectors: Vec<Box<dyn Collector>> = vec![Box::new(Fixed), Box::new(Broken)];
        let mut sampler = Sampler::new(collectors);
        sampler.poll();
        sampler.poll();
        sampler.poll();

        let snap = sampler.snapshot();
        assert_eq!(snap.poll_count, 3);
        assert_eq!(snap.memory.total, 1024.0);
        assert!((0.0..1.0).contains(&snap.random_value));
    }

    #[test]
    fn acknowledge_keeps_unreported_polls() {
        let mut sampler = Sampler::new(Vec::new());
        sampler.poll();
        sampler.poll();
        let reported = sampler.snapshot().poll_count;
        sampler.poll();
        sampler.acknowledge(reported);
        assert_eq!(sampler.snapshot().poll_count, 1);

        sampler.acknowledge(10);
        assert_eq!(sampler.snapshot().poll_count, 0);
    }

    #[test]
    fn default_collectors_fill_snapshot() {
        let mut sampler = Sampler::with_default_collectors().unwrap();
        sampler.poll();
        let snap = sampler.snapshot();
        assert!(snap.memory.total > 0.0);
        assert!(snap.cpu.count >= 1.0);
        assert_eq!(snap.cpu.per_core.len() as f64, snap.cpu.count);
        assert!(snap.process.resident_bytes > 0.0);
    }
}
