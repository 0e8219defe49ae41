use super::params::BenchmarkParams;
use super::summary::{RunSummary, TotalSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BenchmarkReport {
    /// Timestamp when the benchmark was finished
    pub timestamp: String,

    /// Benchmark parameters
    pub params: BenchmarkParams,

    /// Statistics per completed run, in run order
    pub runs: Vec<RunSummary>,

    /// Statistics over all completed runs
    pub totals: TotalSummary,
}

impl BenchmarkReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Every QoS level that has an RTT figure in any run or in the totals.
    pub fn qos_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self
            .runs
            .iter()
            .flat_map(|r| r.average_rtt_ms.keys().copied())
            .chain(self.totals.average_rtt_ms.keys().copied())
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }
}
