use crate::actors::worker::{Worker, WorkerOutcome, WorkerSpec};
use crate::args::common::{BrokenRunPolicy, MqttBenchArgs};
use crate::error::BenchError;
use crate::transport::TransportFactory;
use crate::utils::barrier::RendezvousBarrier;
use crate::workload::WorkloadSpec;
use mqtt_bench_report::run_result::RunResult;
use mqtt_bench_report::worker_result::WorkerPhase;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub topic_prefix: String,
    pub client_id_prefix: String,
    pub barrier_timeout: Duration,
    pub max_inflight: usize,
    pub broken_run_policy: BrokenRunPolicy,
}

impl From<&MqttBenchArgs> for BenchmarkSettings {
    fn from(args: &MqttBenchArgs) -> Self {
        Self {
            topic_prefix: args.topic_prefix.clone(),
            client_id_prefix: args.client_id_prefix.clone(),
            barrier_timeout: args.barrier_timeout,
            max_inflight: args.max_inflight() as usize,
            broken_run_policy: args.on_broken_run,
        }
    }
}

/// Completed runs in order, plus the error that ended the benchmark early.
#[derive(Debug, Default)]
pub struct BenchmarkOutcome {
    pub runs: Vec<RunResult>,
    pub error: Option<BenchError>,
}

/// Executes the workload `run_count` times, one run after the other. Every
/// run spawns one task per worker and releases them all together once each
/// of them is connected.
pub struct Benchmark {
    workload: WorkloadSpec,
    settings: BenchmarkSettings,
    transport_factory: Arc<dyn TransportFactory>,
    barrier: Arc<RendezvousBarrier>,
}

impl Benchmark {
    pub fn new(
        workload: WorkloadSpec,
        settings: BenchmarkSettings,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Self {
        // Every worker plus the orchestrator itself.
        let barrier = Arc::new(RendezvousBarrier::new(workload.total_workers() + 1));
        Self {
            workload,
            settings,
            transport_factory,
            barrier,
        }
    }

    pub fn workload(&self) -> &WorkloadSpec {
        &self.workload
    }

    pub fn barrier_parties(&self) -> usize {
        self.barrier.parties()
    }

    /// One spec per worker, numbered from 1 in group order.
    pub fn plan(&self, run: u32) -> Vec<WorkerSpec> {
        let mut specs = Vec::with_capacity(self.workload.total_workers());
        let mut worker_id = 0;
        for group in self.workload.groups() {
            let topic = group.full_topic(&self.settings.topic_prefix);
            for _ in 0..group.size.get() {
                worker_id += 1;
                specs.push(WorkerSpec {
                    worker_id,
                    run,
                    role: group.role.clone(),
                    topic: topic.clone(),
                    qos: group.qos,
                    client_id: format!("{}-{}", self.settings.client_id_prefix, Uuid::new_v4()),
                    timeout: self.workload.timeout(),
                    max_inflight: self.settings.max_inflight,
                });
            }
        }
        specs
    }

    pub async fn run(&self) -> BenchmarkOutcome {
        let run_count = self.workload.run_count();
        let mut outcome = BenchmarkOutcome::default();
        for run in 1..=run_count {
            info!("Starting run {run} of {run_count}...");
            match self.run_once(run).await {
                Ok(result) => outcome.runs.push(result),
                Err(error @ BenchError::BarrierBroken { .. })
                    if self.settings.broken_run_policy == BrokenRunPolicy::Skip =>
                {
                    warn!("{error}, skipping the run");
                }
                Err(error) => {
                    error!(
                        "{error}, stopping the benchmark after {} completed runs",
                        outcome.runs.len()
                    );
                    outcome.error = Some(error);
                    break;
                }
            }
        }
        outcome
    }

    /// Runs the workload once and joins every worker before returning.
    pub async fn run_once(&self, run: u32) -> Result<RunResult, BenchError> {
        if self.barrier.is_broken() {
            self.barrier.reset();
        }

        let specs = self.plan(run);
        let (results_sender, mut results) = mpsc::unbounded_channel::<WorkerOutcome>();
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let worker = Worker::new(
                spec.clone(),
                self.transport_factory.clone(),
                self.barrier.party(),
            );
            let results_sender = results_sender.clone();
            let handle = tokio::spawn(async move {
                let _ = results_sender.send(worker.run().await);
            });
            handles.push((spec, handle));
        }
        drop(results_sender);

        info!(
            "Run {run} → waiting for {} workers to connect to {}...",
            self.barrier_parties() - 1,
            self.transport_factory.server_address()
        );
        let released = self.barrier.wait_timeout(self.settings.barrier_timeout).await;
        match released {
            Ok(()) => info!(
                "Run {run} → all workers ready, measuring for {:.2} s...",
                self.workload.timeout().as_secs_f64()
            ),
            Err(cause) => error!("Run {run} → workers could not be synchronized: {cause}"),
        }

        let mut result = RunResult::new(run);
        for (spec, handle) in handles {
            if let Err(join_error) = handle.await {
                error!(
                    "Run {run} → task of worker #{} ended abnormally: {join_error}",
                    spec.worker_id
                );
                let phase = match released {
                    Ok(()) => WorkerPhase::Publishing,
                    Err(_) => WorkerPhase::Barrier,
                };
                result.failures.push(spec.failure(phase, join_error));
            }
        }
        while let Ok(outcome) = results.try_recv() {
            match outcome {
                Ok(worker) => result.workers.push(worker),
                Err(failure) => result.failures.push(failure),
            }
        }
        result.workers.sort_by_key(|worker| worker.worker_id);
        result.failures.sort_by_key(|failure| failure.worker_id);

        if let Err(cause) = released {
            return Err(BenchError::BarrierBroken { run, cause });
        }
        info!(
            "Run {run} → finished with {} workers measured and {} failed, windows started within {:.3} ms",
            result.workers.len(),
            result.failures.len(),
            result.window_start_skew().as_secs_f64() * 1000.0
        );
        Ok(result)
    }
}
