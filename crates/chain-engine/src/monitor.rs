//! Trace and mean monitors.

use chain_core::{SArray, NA};

/// Monitor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// Every retained sample (`base::TraceMonitor`).
    Trace,
    /// Running mean of the retained samples (`base::MeanMonitor`).
    Mean,
}

impl MonitorKind {
    /// Parses a monitor type label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "trace" => Some(MonitorKind::Trace),
            "mean" => Some(MonitorKind::Mean),
            _ => None,
        }
    }

    /// Monitor type label.
    pub fn label(&self) -> &'static str {
        match self {
            MonitorKind::Trace => "trace",
            MonitorKind::Mean => "mean",
        }
    }
}

/// A monitor over the whole of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    node: usize,
    name: String,
    dims: Vec<usize>,
    kind: MonitorKind,
    thin: u32,
    start: u64,
    recorded: u64,
    records: Vec<Vec<f64>>,
}

impl Monitor {
    /// Starts monitoring at iteration `start` and every `thin`-th one after.
    pub fn new(
        node: usize,
        name: impl Into<String>,
        dims: Vec<usize>,
        kind: MonitorKind,
        thin: u32,
        start: u64,
        chains: usize,
    ) -> Self {
        Self {
            node,
            name: name.into(),
            dims,
            kind,
            thin: thin.max(1),
            start,
            recorded: 0,
            records: vec![Vec::new(); chains],
        }
    }

    /// Monitored node.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Monitored variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monitor type.
    pub fn kind(&self) -> MonitorKind {
        self.kind
    }

    /// Samples retained so far per chain.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Offers the values after iteration `iteration`, one slice per chain.
    pub fn record<'a>(&mut self, iteration: u64, chains: impl Iterator<Item = &'a [f64]>) {
        if iteration < self.start || (iteration - self.start) % u64::from(self.thin) != 0 {
            return;
        }
        self.recorded += 1;
        for (record, values) in self.records.iter_mut().zip(chains) {
            match self.kind {
                MonitorKind::Trace => record.extend_from_slice(values),
                MonitorKind::Mean if record.is_empty() => record.extend_from_slice(values),
                MonitorKind::Mean => {
                    for (sum, value) in record.iter_mut().zip(values) {
                        *sum += value;
                    }
                }
            }
        }
    }

    /// Retained samples laid out as `[dims.., iterations, chains]`, or
    /// `[dims.., iterations * chains]` when `flat`.
    pub fn dump(&self, flat: bool) -> Result<SArray, String> {
        let chains = self.records.len();
        let mut dims = self.dims.clone();
        let values: Vec<f64> = match self.kind {
            MonitorKind::Trace => {
                if flat {
                    dims.push(self.recorded as usize * chains);
                } else {
                    dims.push(self.recorded as usize);
                    dims.push(chains);
                }
                self.records.concat()
            }
            MonitorKind::Mean => {
                if flat {
                    dims.push(chains);
                } else {
                    dims.push(1);
                    dims.push(chains);
                }
                let len: usize = self.dims.iter().product();
                let count = self.recorded as f64;
                self.records
                    .iter()
                    .flat_map(|sums| {
                        (0..len).map(move |elem| match sums.get(elem) {
                            Some(sum) => sum / count,
                            None => NA,
                        })
                    })
                    .collect()
            }
        };
        SArray::from_parts(dims, values).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinning_keeps_every_nth_iteration() {
        let mut monitor = Monitor::new(0, "mu", vec![1], MonitorKind::Trace, 3, 11, 1);
        for iteration in 1..=20u64 {
            let value = [iteration as f64];
            monitor.record(iteration, std::iter::once(&value[..]));
        }
        let dump = monitor.dump(false).unwrap();
        assert_eq!(dump.dims(), &[1, 4, 1]);
        assert_eq!(dump.values(), &[11.0, 14.0, 17.0, 20.0]);
    }

    #[test]
    fn mean_monitor_averages_per_chain() {
        let mut monitor = Monitor::new(0, "p", vec![2], MonitorKind::Mean, 1, 1, 2);
        monitor.record(1, [&[1.0, 2.0][..], &[5.0, 6.0][..]].into_iter());
        monitor.record(2, [&[3.0, 4.0][..], &[7.0, 8.0][..]].into_iter());
        let dump = monitor.dump(false).unwrap();
        assert_eq!(dump.dims(), &[2, 1, 2]);
        assert_eq!(dump.values(), &[2.0, 3.0, 6.0, 7.0]);
    }
}
