use metrix_collector::Snapshot;
use metrix_common::types::RequestMetric;

pub const POLL_COUNT: &str = "PollCount";
pub const RANDOM_VALUE: &str = "RandomValue";

/// Turns a snapshot into the ordered wire items of one report cycle.
///
/// Gauges come first in a fixed order, followed by one `CPUutilizationN`
/// gauge per core (numbered from 1), `RandomValue`, and the `PollCount`
/// counter last.
pub fn flatten(snapshot: &Snapshot) -> Vec<RequestMetric> {
    let p = &snapshot.process;
    let m = &snapshot.memory;
    let c = &snapshot.cpu;
    let l = &snapshot.load;

    let fixed = [
        ("ProcessResidentMemory", p.resident_bytes),
        ("ProcessVirtualMemory", p.virtual_bytes),
        ("ProcessCPUUsage", p.cpu_usage),
        ("ProcessRunTime", p.run_time_secs),
        ("ProcessDiskRead", p.disk_read_bytes),
        ("ProcessDiskWritten", p.disk_written_bytes),
        ("TotalMemory", m.total),
        ("FreeMemory", m.free),
        ("AvailableMemory", m.available),
        ("UsedMemory", m.used),
        ("TotalSwap", m.swap_total),
        ("FreeSwap", m.swap_free),
        ("UsedSwap", m.swap_used),
        ("CPUCount", c.count),
        ("CPUUsage", c.global_usage),
        ("LoadAverage1", l.one),
        ("LoadAverage5", l.five),
        ("LoadAverage15", l.fifteen),
        ("Uptime", l.uptime_secs),
    ];

    let mut items = Vec::with_capacity(fixed.len() + c.per_core.len() + 2);
    items.extend(fixed.iter().map(|(name, v)| RequestMetric::gauge(*name, *v)));
    items.extend(
        c.per_core
            .iter()
            .enumerate()
            .map(|(i, v)| RequestMetric::gauge(format!("CPUutilization{}", i + 1), *v)),
    );
    items.push(RequestMetric::gauge(RANDOM_VALUE, snapshot.random_value));
    items.push(RequestMetric::counter(POLL_COUNT, snapshot.poll_count));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrix_common::types::MetricKind;
    use std::collections::HashSet;

    #[test]
    fn flattens_every_field_once() {
        let mut snapshot = Snapshot::default();
        snapshot.cpu.per_core = vec![10.0, 20.0, 30.0];
        snapshot.memory.total = 2048.0;
        snapshot.poll_count = 5;
        snapshot.random_value = 0.5;

        let items = flatten(&snapshot);
        assert_eq!(items.len(), 19 + 3 + 2);

        let names: HashSet<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(names.len(), items.len(), "names are unique");

        let last = items.last().unwrap();
        assert_eq!(last, &RequestMetric::counter(POLL_COUNT, 5));
        assert!(items.contains(&RequestMetric::gauge("TotalMemory", 2048.0)));
        assert!(items.contains(&RequestMetric::gauge("CPUutilization3", 30.0)));
        assert!(items.contains(&RequestMetric::gauge(RANDOM_VALUE, 0.5)));

        let counters = items.iter().filter(|i| i.kind == MetricKind::Counter).count();
        assert_eq!(counters, 1);
    }
}
