use crate::utils::round_float;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run: u32,
    pub sent_messages: u64,
    pub received_messages: u64,
    pub lost_messages: u64,
    /// Average publisher RTT in milliseconds keyed by QoS level.
    pub average_rtt_ms: BTreeMap<u8, f64>,
    #[serde(serialize_with = "round_float")]
    pub average_elapsed_secs: f64,
    #[serde(serialize_with = "round_float")]
    pub throughput_messages_per_second: f64,
    pub failed_workers: usize,
    pub interrupted_workers: usize,
}

/// Statistics over every reported run.
///
/// Message counters are grand totals while time based values are averages
/// over the number of runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TotalSummary {
    pub runs: u32,
    pub sent_messages: u64,
    pub received_messages: u64,
    pub lost_messages: u64,
    pub average_rtt_ms: BTreeMap<u8, f64>,
    #[serde(serialize_with = "round_float")]
    pub average_elapsed_secs: f64,
    #[serde(serialize_with = "round_float")]
    pub average_throughput_messages_per_second: f64,
    pub failed_workers: usize,
    pub interrupted_workers: usize,
}
