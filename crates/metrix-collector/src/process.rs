use crate::{Collector, Snapshot};
use anyhow::{anyhow, Result};
use sysinfo::{Pid, System};

/// Statistics of the current process.
pub struct ProcessCollector {
    system: System,
    pid: Pid,
}

impl ProcessCollector {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve own pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl Collector for ProcessCollector {
    fn name(&self) -> &str {
        "process"
    }

    fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()> {
        self.system.refresh_all();
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} not found", self.pid))?;

        let stats = &mut snapshot.process;
        stats.resident_bytes = process.memory() as f64;
        stats.virtual_bytes = process.virtual_memory() as f64;
        stats.cpu_usage = process.cpu_usage() as f64;
        stats.run_time_secs = process.run_time() as f64;

        let disk = process.disk_usage();
        stats.disk_read_bytes = disk.total_read_bytes as f64;
        stats.disk_written_bytes = disk.total_written_bytes as f64;
        Ok(())
    }
}
