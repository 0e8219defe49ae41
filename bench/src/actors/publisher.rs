use super::envelope::{micros_since_epoch, Envelope};
use super::worker::{WorkerEvents, WorkerSpec};
use crate::error::TransportError;
use crate::transport::{DeliveryAck, Transport};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use mqtt_bench_report::actor_kind::ActorKind;
use mqtt_bench_report::worker_result::{WorkerFailure, WorkerPhase, WorkerResult};
use std::time::{Duration, SystemTime};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

pub struct Publisher<'a> {
    spec: &'a WorkerSpec,
    payload: Bytes,
}

impl<'a> Publisher<'a> {
    pub fn new(spec: &'a WorkerSpec, payload: Bytes) -> Self {
        Self { spec, payload }
    }

    /// Publishes timestamped envelopes until the window closes, keeping at
    /// most `max_inflight` deliveries unacknowledged.
    pub async fn run(
        &self,
        transport: &mut dyn Transport,
        events: &WorkerEvents,
    ) -> Result<WorkerResult, WorkerFailure> {
        let spec = self.spec;
        let max_inflight = spec.max_inflight.max(1);
        info!(
            "Publisher #{} → publishing to {} with QoS {} for {:.2} s...",
            spec.worker_id,
            spec.topic,
            spec.qos,
            spec.timeout.as_secs_f64()
        );

        let window_start = SystemTime::now();
        let start = Instant::now();
        let deadline = start + spec.timeout;
        let mut inflight = FuturesUnordered::new();
        let mut rtt_samples = Vec::new();
        let mut sent_count = 0u64;
        let mut interrupted = false;

        while Instant::now() < deadline && !events.is_connection_lost() {
            if inflight.len() >= max_inflight {
                match timeout_at(deadline, inflight.next()).await {
                    Ok(Some(delivery)) => Self::record(delivery, &mut rtt_samples),
                    Ok(None) => {}
                    Err(_) => break,
                }
                continue;
            }

            let envelope = Envelope::now(self.payload.clone()).encode();
            match transport.publish(&spec.topic, envelope, spec.qos, false).await {
                Ok(token) => {
                    sent_count += 1;
                    inflight.push(token);
                }
                Err(error) if sent_count == 0 => {
                    return Err(spec.failure(WorkerPhase::Publishing, error));
                }
                Err(error) => {
                    warn!(
                        "Publisher #{} → publish failed after {} messages: {error}",
                        spec.worker_id, sent_count
                    );
                    interrupted = true;
                    break;
                }
            }
        }
        let elapsed = start.elapsed();
        interrupted |= events.is_connection_lost();

        let outstanding = inflight.len();
        let drained = timeout(spec.timeout, async {
            while let Some(delivery) = inflight.next().await {
                Self::record(delivery, &mut rtt_samples);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Publisher #{} → {} of {} outstanding acknowledgements did not arrive",
                spec.worker_id,
                inflight.len(),
                outstanding
            );
        }

        let result = WorkerResult {
            worker_id: spec.worker_id,
            topic: spec.topic.clone(),
            qos: spec.qos.as_u8(),
            role: ActorKind::Publisher,
            sent_count,
            received_count: 0,
            elapsed_millis: elapsed.as_millis() as u64,
            window_start_micros: micros_since_epoch(window_start),
            rtt_samples,
            interrupted,
        };
        Self::log_publisher_statistics(&result);
        Ok(result)
    }

    fn record(delivery: Result<DeliveryAck, TransportError>, rtt_samples: &mut Vec<Duration>) {
        let ack = match delivery {
            Ok(ack) => ack,
            Err(error) => {
                debug!("Delivery not acknowledged: {error}");
                return;
            }
        };
        match Envelope::decode(&ack.payload) {
            Ok(envelope) => rtt_samples.push(envelope.round_trip_time(SystemTime::now())),
            Err(error) => debug!("Acknowledged payload is not an envelope: {error}"),
        }
    }

    fn log_publisher_statistics(result: &WorkerResult) {
        info!(
            "Publisher #{} → sent {} messages to {} in {:.2} s, acknowledged: {}, \
    average RTT: {:.2} ms, p50 RTT: {:.2} ms, p99 RTT: {:.2} ms{}",
            result.worker_id,
            result.sent_count,
            result.topic,
            result.elapsed_secs(),
            result.rtt_samples.len(),
            result.average_rtt_ms(),
            result.rtt_percentile_ms(50.0),
            result.rtt_percentile_ms(99.0),
            if result.interrupted { ", interrupted" } else { "" }
        );
    }
}
