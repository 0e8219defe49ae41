use super::envelope::micros_since_epoch;
use super::worker::{WorkerEvents, WorkerSpec};
use mqtt_bench_report::actor_kind::ActorKind;
use mqtt_bench_report::worker_result::{WorkerFailure, WorkerResult};
use std::time::SystemTime;
use tokio::time::{sleep_until, Instant};
use tracing::info;

pub struct Subscriber<'a> {
    spec: &'a WorkerSpec,
}

impl<'a> Subscriber<'a> {
    pub fn new(spec: &'a WorkerSpec) -> Self {
        Self { spec }
    }

    /// Counts deliveries until the window closes or the connection is lost.
    pub async fn run(&self, events: &WorkerEvents) -> Result<WorkerResult, WorkerFailure> {
        let spec = self.spec;
        info!(
            "Subscriber #{} → receiving from {} with QoS {} for {:.2} s...",
            spec.worker_id,
            spec.topic,
            spec.qos,
            spec.timeout.as_secs_f64()
        );

        let window_start = SystemTime::now();
        let start = Instant::now();
        let interrupted = tokio::select! {
            _ = sleep_until(start + spec.timeout) => false,
            _ = events.wait_connection_lost() => true,
        };
        let received_count = events.received();
        let elapsed = start.elapsed();

        let result = WorkerResult {
            worker_id: spec.worker_id,
            topic: spec.topic.clone(),
            qos: spec.qos.as_u8(),
            role: ActorKind::Subscriber,
            sent_count: 0,
            received_count,
            elapsed_millis: elapsed.as_millis() as u64,
            window_start_micros: micros_since_epoch(window_start),
            rtt_samples: Vec::new(),
            interrupted,
        };
        Self::log_subscriber_statistics(&result);
        Ok(result)
    }

    fn log_subscriber_statistics(result: &WorkerResult) {
        info!(
            "Subscriber #{} → received {} messages from {} in {:.2} s{}",
            result.worker_id,
            result.received_count,
            result.topic,
            result.elapsed_secs(),
            if result.interrupted { ", interrupted" } else { "" }
        );
    }
}
