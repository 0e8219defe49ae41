use super::worker_result::{WorkerFailure, WorkerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every worker outcome collected for one repetition of the workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    /// 1-based repetition index.
    pub run: u32,
    pub workers: Vec<WorkerResult>,
    pub failures: Vec<WorkerFailure>,
}

impl RunResult {
    pub fn new(run: u32) -> Self {
        Self {
            run,
            workers: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn publishers(&self) -> impl Iterator<Item = &WorkerResult> {
        self.workers.iter().filter(|w| w.is_publisher())
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &WorkerResult> {
        self.workers.iter().filter(|w| w.is_subscriber())
    }

    pub fn interrupted_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.interrupted).count()
    }

    /// Spread between the first and the last worker entering its timed window.
    pub fn window_start_skew(&self) -> Duration {
        let starts = self.workers.iter().map(|w| w.window_start_micros);
        match (starts.clone().min(), starts.max()) {
            (Some(first), Some(last)) => Duration::from_micros(last - first),
            _ => Duration::ZERO,
        }
    }
}
