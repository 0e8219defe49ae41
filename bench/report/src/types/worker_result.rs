use super::actor_kind::ActorKind;
use crate::utils::calculate_percentile;
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a single worker for a single run.
///
/// Built by the worker once its timed window is over and never mutated after
/// it has been handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResult {
    pub worker_id: u32,
    pub topic: String,
    pub qos: u8,
    pub role: ActorKind,
    pub sent_count: u64,
    pub received_count: u64,
    pub elapsed_millis: u64,
    /// Wall clock start of the timed window in microseconds since the Unix epoch.
    #[serde(default)]
    pub window_start_micros: u64,
    /// One sample per acknowledged publish, empty for subscribers.
    pub rtt_samples: Vec<Duration>,
    /// The connection was lost inside the timed window, counts are partial.
    pub interrupted: bool,
}

impl WorkerResult {
    pub fn is_publisher(&self) -> bool {
        self.role == ActorKind::Publisher
    }

    pub fn is_subscriber(&self) -> bool {
        self.role == ActorKind::Subscriber
    }

    /// Mean round-trip time in milliseconds, `0.0` when no acknowledgement was observed.
    pub fn average_rtt_ms(&self) -> f64 {
        if self.rtt_samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.rtt_samples.iter().map(duration_as_ms).sum();
        total / self.rtt_samples.len() as f64
    }

    pub fn rtt_percentile_ms(&self, percentile: f64) -> f64 {
        let mut samples: Vec<f64> = self.rtt_samples.iter().map(duration_as_ms).collect();
        samples.sort_by(|a, b| a.total_cmp(b));
        calculate_percentile(&samples, percentile)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_millis as f64 / 1000.0
    }
}

fn duration_as_ms(duration: &Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum WorkerPhase {
    #[display("connecting")]
    #[serde(rename = "connecting")]
    Connecting,
    #[display("subscribing")]
    #[serde(rename = "subscribing")]
    Subscribing,
    #[display("barrier")]
    #[serde(rename = "barrier")]
    Barrier,
    #[display("publishing")]
    #[serde(rename = "publishing")]
    Publishing,
}

/// A worker that could not produce a measurement.
///
/// Failures are kept out of the aggregated statistics but are reported
/// alongside them so a run with missing workers is visible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerFailure {
    pub worker_id: u32,
    pub topic: String,
    pub role: ActorKind,
    pub phase: WorkerPhase,
    pub reason: String,
}
