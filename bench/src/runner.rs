use crate::analytics::report_builder::BenchmarkReportBuilder;
use crate::args::common::{MqttBenchArgs, OutputFormat};
use crate::benchmarks::benchmark::{Benchmark, BenchmarkSettings};
use crate::error::BenchError;
use crate::utils::transport_factory::create_transport_factory;
use crate::workload::{write_sample, WorkloadSpec};
use mqtt_bench_report::params::BenchmarkParams;
use std::env;
use tracing::{info, warn};

pub struct BenchmarkRunner {
    args: MqttBenchArgs,
}

impl BenchmarkRunner {
    pub fn new(args: MqttBenchArgs) -> Self {
        Self { args }
    }

    /// Runs the whole benchmark and prints the report of every completed run,
    /// even when a broken run stopped the benchmark early.
    pub async fn run(self) -> Result<(), BenchError> {
        let args = self.args;
        let workload = match args.workload_file() {
            Some(path) => WorkloadSpec::load(path)?,
            None => {
                if let Some(path) = &args.workload_file {
                    warn!("Workload file {} is not a readable file", path.display());
                }
                let sample = write_sample(&env::current_dir()?)?;
                return Err(BenchError::SampleWorkloadWritten(sample));
            }
        };

        let transport_factory = create_transport_factory(&args)?;
        let transport = args.transport();
        let server_address = transport_factory.server_address().to_owned();
        info!("Starting to benchmark: {transport} with server: {server_address}");

        let benchmark = Benchmark::new(
            workload,
            BenchmarkSettings::from(&args),
            transport_factory,
        );
        let params = benchmark_params(&args, benchmark.workload(), &server_address);
        let outcome = benchmark.run().await;
        info!("Benchmarking finished, {} runs completed", outcome.runs.len());

        let report = BenchmarkReportBuilder::build(params, &outcome.runs);
        match args.output_format {
            OutputFormat::Table => report.print_summary(args.verbose),
            OutputFormat::Json => report.print_json()?,
        }

        match outcome.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn benchmark_params(
    args: &MqttBenchArgs,
    workload: &WorkloadSpec,
    server_address: &str,
) -> BenchmarkParams {
    BenchmarkParams {
        transport: args.transport(),
        server_address: server_address.to_owned(),
        run_count: workload.run_count(),
        timeout_secs: workload.timeout().as_secs(),
        groups: workload.groups().len() as u32,
        publishers: workload.publishers(),
        subscribers: workload.subscribers(),
        topics: workload.distinct_topics() as u32,
        max_inflight: args.max_inflight() as u32,
    }
}
