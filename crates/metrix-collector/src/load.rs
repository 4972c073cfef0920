use crate::{Collector, Snapshot};
use anyhow::Result;
use sysinfo::System;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self, snapshot: &mut Snapshot) -> Result<()> {
        let avg = System::load_average();
        snapshot.load.one = avg.one;
        snapshot.load.five = avg.five;
        snapshot.load.fifteen = avg.fifteen;
        snapshot.load.uptime_secs = System::uptime() as f64;
        Ok(())
    }
}
