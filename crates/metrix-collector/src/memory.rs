use crate::{Collector, Snapshot};
use anyhow::Result;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()> {
        self.system.refresh_memory();
        let mem = &mut snapshot.memory;

        mem.total = self.system.total_memory() as f64;
        mem.free = self.system.free_memory() as f64;
        mem.available = self.system.available_memory() as f64;
        mem.used = self.system.used_memory() as f64;

        mem.swap_total = self.system.total_swap() as f64;
        mem.swap_free = self.system.free_swap() as f64;
        mem.swap_used = self.system.used_swap() as f64;
        Ok(())
    }
}
