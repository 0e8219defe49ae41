use super::publisher::Publisher;
use super::subscriber::Subscriber;
use crate::error::TransportError;
use crate::transport::{QualityOfService, Transport, TransportFactory, TransportListener};
use crate::utils::barrier::BarrierParty;
use crate::workload::Role;
use mqtt_bench_report::actor_kind::ActorKind;
use mqtt_bench_report::worker_result::{WorkerFailure, WorkerPhase, WorkerResult};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

pub type WorkerOutcome = Result<WorkerResult, WorkerFailure>;

/// Everything a worker needs to know about its part in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    pub worker_id: u32,
    pub run: u32,
    pub role: Role,
    /// Topic including the benchmark prefix.
    pub topic: String,
    pub qos: QualityOfService,
    pub client_id: String,
    pub timeout: Duration,
    pub max_inflight: usize,
}

impl WorkerSpec {
    pub fn actor_kind(&self) -> ActorKind {
        match self.role {
            Role::Publisher { .. } => ActorKind::Publisher,
            Role::Subscriber => ActorKind::Subscriber,
        }
    }

    pub fn failure(&self, phase: WorkerPhase, reason: impl Display) -> WorkerFailure {
        WorkerFailure {
            worker_id: self.worker_id,
            topic: self.topic.clone(),
            role: self.actor_kind(),
            phase,
            reason: reason.to_string(),
        }
    }
}

/// Listener shared between a worker and its transport's event task.
#[derive(Default)]
pub struct WorkerEvents {
    received: AtomicU64,
    connection_lost: AtomicBool,
    connection_lost_notify: Notify,
}

impl WorkerEvents {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::Acquire)
    }

    pub async fn wait_connection_lost(&self) {
        loop {
            let notified = self.connection_lost_notify.notified();
            if self.is_connection_lost() {
                return;
            }
            notified.await;
        }
    }
}

impl TransportListener for WorkerEvents {
    fn message_arrived(&self, _topic: &str, _payload: &[u8]) {
        self.received.fetch_add(1, Ordering::AcqRel);
    }

    fn connection_lost(&self, cause: &TransportError) {
        warn!("Connection lost: {cause}");
        self.connection_lost.store(true, Ordering::Release);
        self.connection_lost_notify.notify_waiters();
    }
}

/// One publisher or subscriber for one run: connects, meets every other
/// party at the barrier, measures for the configured window and disconnects.
pub struct Worker {
    spec: WorkerSpec,
    transport_factory: Arc<dyn TransportFactory>,
    party: BarrierParty,
}

impl Worker {
    pub fn new(
        spec: WorkerSpec,
        transport_factory: Arc<dyn TransportFactory>,
        party: BarrierParty,
    ) -> Self {
        Self {
            spec,
            transport_factory,
            party,
        }
    }

    pub async fn run(self) -> WorkerOutcome {
        let Worker {
            spec,
            transport_factory,
            party,
        } = self;
        let events = Arc::new(WorkerEvents::default());

        let prepared = tokio::select! {
            prepared = Self::prepare(&spec, transport_factory.as_ref(), events.clone()) => prepared,
            _ = party.broken() => {
                Err(spec.failure(WorkerPhase::Barrier, "barrier broken during setup"))
            }
        };

        // Failed workers still arrive so that their siblings can proceed.
        let arrival = party.arrive().await;
        let mut transport = match (prepared, arrival) {
            (Ok(transport), Ok(())) => transport,
            (Ok(mut transport), Err(barrier_error)) => {
                transport.close().await;
                return Err(Self::report_failure(
                    spec.failure(WorkerPhase::Barrier, barrier_error),
                    spec.run,
                ));
            }
            (Err(failure), _) => return Err(Self::report_failure(failure, spec.run)),
        };

        let outcome = match &spec.role {
            Role::Publisher { payload } => {
                Publisher::new(&spec, payload.clone())
                    .run(transport.as_mut(), &events)
                    .await
            }
            Role::Subscriber => Subscriber::new(&spec).run(&events).await,
        };

        if !events.is_connection_lost() {
            if let Err(error) = transport.disconnect().await {
                debug!(
                    "Worker #{} → disconnect from {} failed: {error}",
                    spec.worker_id,
                    transport_factory.server_address()
                );
            }
        }
        transport.close().await;
        outcome.map_err(|failure| Self::report_failure(failure, spec.run))
    }

    async fn prepare(
        spec: &WorkerSpec,
        transport_factory: &dyn TransportFactory,
        events: Arc<WorkerEvents>,
    ) -> Result<Box<dyn Transport>, WorkerFailure> {
        let mut transport = transport_factory
            .create_transport(&spec.client_id, events)
            .await
            .map_err(|e| spec.failure(WorkerPhase::Connecting, e))?;

        debug!(
            "Worker #{} → connecting to {} as {}...",
            spec.worker_id,
            transport_factory.server_address(),
            spec.client_id
        );
        if let Err(error) = transport.connect().await {
            transport.close().await;
            return Err(spec.failure(WorkerPhase::Connecting, error));
        }

        if let Role::Subscriber = spec.role {
            if let Err(error) = transport.subscribe(&spec.topic, spec.qos).await {
                transport.close().await;
                return Err(spec.failure(WorkerPhase::Subscribing, error));
            }
        }
        Ok(transport)
    }

    fn report_failure(failure: WorkerFailure, run: u32) -> WorkerFailure {
        error!(
            "Run {run}: {} #{} on {} failed while {}: {}",
            failure.role, failure.worker_id, failure.topic, failure.phase, failure.reason
        );
        failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::{LoopbackBroker, LoopbackTransportFactory};
    use crate::utils::barrier::RendezvousBarrier;
    use bytes::Bytes;

    fn spec(worker_id: u32, role: Role, timeout: Duration) -> WorkerSpec {
        WorkerSpec {
            worker_id,
            run: 1,
            role,
            topic: "/bench/t".to_owned(),
            qos: QualityOfService::AtLeastOnce,
            client_id: format!("test-{worker_id}"),
            timeout,
            max_inflight: 4,
        }
    }

    #[test]
    fn failures_carry_worker_identity() {
        let spec = spec(3, Role::Subscriber, Duration::from_secs(1));
        let failure = spec.failure(WorkerPhase::Subscribing, "rejected");

        assert_eq!(failure.worker_id, 3);
        assert_eq!(failure.role, ActorKind::Subscriber);
        assert_eq!(failure.phase, WorkerPhase::Subscribing);
        assert_eq!(failure.reason, "rejected");
    }

    #[tokio::test]
    async fn connection_lost_wakes_waiters_once_signalled() {
        let events = Arc::new(WorkerEvents::default());
        let waiter = tokio::spawn({
            let events = events.clone();
            async move { events.wait_connection_lost().await }
        });

        events.connection_lost(&TransportError::ConnectionLost("gone".to_owned()));

        waiter.await.unwrap();
        assert!(events.is_connection_lost());
        events.wait_connection_lost().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refused_worker_still_arrives_at_the_barrier() {
        let broker = LoopbackBroker::new();
        broker.set_refuse_connections(true);
        let factory: Arc<dyn TransportFactory> =
            Arc::new(LoopbackTransportFactory::new(broker));
        let barrier = Arc::new(RendezvousBarrier::new(2));
        let worker = Worker::new(
            spec(1, Role::Subscriber, Duration::from_millis(10)),
            factory,
            barrier.party(),
        );
        let handle = tokio::spawn(worker.run());

        barrier.wait().await.unwrap();

        let failure = handle.await.unwrap().unwrap_err();
        assert_eq!(failure.phase, WorkerPhase::Connecting);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscriber_counts_messages_from_a_publisher() {
        let factory: Arc<dyn TransportFactory> =
            Arc::new(LoopbackTransportFactory::new(LoopbackBroker::new()));
        let barrier = Arc::new(RendezvousBarrier::new(3));
        let window = Duration::from_millis(100);
        let subscriber = Worker::new(
            spec(1, Role::Subscriber, window),
            factory.clone(),
            barrier.party(),
        );
        let publisher = Worker::new(
            spec(
                2,
                Role::Publisher {
                    payload: Bytes::from_static(b"hello"),
                },
                window,
            ),
            factory,
            barrier.party(),
        );
        let subscriber = tokio::spawn(subscriber.run());
        let publisher = tokio::spawn(publisher.run());

        barrier.wait().await.unwrap();

        let subscriber = subscriber.await.unwrap().unwrap();
        let publisher = publisher.await.unwrap().unwrap();
        assert!(publisher.sent_count > 0);
        assert_eq!(publisher.rtt_samples.len() as u64, publisher.sent_count);
        assert!(subscriber.received_count > 0);
        assert!(subscriber.received_count <= publisher.sent_count);
        assert!(!subscriber.interrupted);
    }
}
