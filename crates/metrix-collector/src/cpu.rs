use crate::{Collector, Snapshot};
use anyhow::Result;
use sysinfo::System;

/// Global and per-core utilization. The first sample after construction is
/// relative to the refresh done in [`CpuCollector::new`].
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()> {
        self.system.refresh_cpu_all();
        let cpus = self.system.cpus();

        snapshot.cpu.count = cpus.len() as f64;
        snapshot.cpu.global_usage = self.system.global_cpu_usage() as f64;
        snapshot.cpu.per_core = cpus.iter().map(|c| c.cpu_usage() as f64).collect();
        Ok(())
    }
}
