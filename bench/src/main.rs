mod actors;
mod analytics;
mod args;
mod benchmarks;
mod error;
mod runner;
mod transport;
mod utils;
mod workload;

use crate::args::common::MqttBenchArgs;
use crate::runner::BenchmarkRunner;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = MqttBenchArgs::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    info!("Starting the benchmarks...");
    match BenchmarkRunner::new(args).run().await {
        Ok(()) => {
            info!("Finished the benchmarks.");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
