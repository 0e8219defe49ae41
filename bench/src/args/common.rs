use super::defaults::*;
use clap::{ArgAction, Parser, ValueEnum};
use mqtt_bench_report::transport::BenchmarkTransport;
use std::num::NonZeroU16;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
pub struct MqttBenchArgs {
    /// Print version
    #[arg(long, action = ArgAction::Version)]
    version: (),

    /// Workload file (JSON, or TOML by extension). When missing a sample workload is written to the current directory
    #[arg(value_name = "WORKLOAD_FILE")]
    pub workload_file: Option<PathBuf>,

    /// Address of the MQTT broker
    #[arg(value_name = "SERVER_ADDRESS", default_value_t = DEFAULT_SERVER_ADDRESS.to_owned())]
    pub server_address: String,

    /// Print one row per run in addition to the totals
    #[arg(long, short = 'V', default_value_t = DEFAULT_VERBOSE)]
    pub verbose: bool,

    /// Transport used by the workers
    #[arg(long, value_enum, default_value_t = TransportArg::Mqtt)]
    pub transport: TransportArg,

    /// Namespace prepended to every topic of the workload
    #[arg(long, default_value_t = DEFAULT_TOPIC_PREFIX.to_owned())]
    pub topic_prefix: String,

    /// Prefix of every client id, a random suffix keeps them unique
    #[arg(long, default_value_t = DEFAULT_CLIENT_ID_PREFIX.to_owned())]
    pub client_id_prefix: String,

    /// Maximum number of unacknowledged publishes per publisher
    #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT)]
    pub max_inflight: NonZeroU16,

    /// MQTT keep alive interval, zero disables it
    #[arg(long, default_value = DEFAULT_KEEP_ALIVE, value_parser = parse_keep_alive)]
    pub keep_alive: Duration,

    /// Time allowed for the broker to acknowledge a connection
    #[arg(long, default_value = DEFAULT_CONNECT_TIMEOUT, value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Time the orchestrator waits for all workers to become ready in a run
    #[arg(long, default_value = DEFAULT_BARRIER_TIMEOUT, value_parser = humantime::parse_duration)]
    pub barrier_timeout: Duration,

    /// Keep reconnecting after a lost connection instead of ending the worker
    #[arg(long, default_value_t = DEFAULT_AUTOMATIC_RECONNECT)]
    pub automatic_reconnect: bool,

    /// What to do when a run cannot synchronize its workers
    #[arg(long, value_enum, default_value_t = BrokenRunPolicy::Abort)]
    pub on_broken_run: BrokenRunPolicy,

    /// Report format printed after the last run
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Mqtt,
    Loopback,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrokenRunPolicy {
    /// Stop the benchmark and report the completed runs
    #[default]
    Abort,
    /// Log the run and continue with the next one
    Skip,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<TransportArg> for BenchmarkTransport {
    fn from(transport: TransportArg) -> Self {
        match transport {
            TransportArg::Mqtt => BenchmarkTransport::Mqtt,
            TransportArg::Loopback => BenchmarkTransport::Loopback,
        }
    }
}

fn parse_keep_alive(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if !duration.is_zero() && duration < Duration::from_secs(1) {
        return Err(format!(
            "keep alive must be zero or at least one second, got '{value}'"
        ));
    }
    Ok(duration)
}

impl MqttBenchArgs {
    pub fn transport(&self) -> BenchmarkTransport {
        self.transport.into()
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// The workload file, only when it names an existing regular file.
    pub fn workload_file(&self) -> Option<&Path> {
        self.workload_file.as_deref().filter(|path| path.is_file())
    }

    pub fn max_inflight(&self) -> u16 {
        self.max_inflight.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        MqttBenchArgs::command().debug_assert();
    }

    #[test]
    fn defaults_are_applied_without_arguments() {
        let args = MqttBenchArgs::try_parse_from(["mqtt-bench"]).unwrap();

        assert_eq!(args.workload_file, None);
        assert_eq!(args.server_address(), "tcp://127.0.0.1:1883");
        assert_eq!(args.transport(), BenchmarkTransport::Mqtt);
        assert_eq!(args.topic_prefix, "/mqtt-bench");
        assert_eq!(args.client_id_prefix, "mqtt-client");
        assert_eq!(args.max_inflight(), 10);
        assert_eq!(args.keep_alive, Duration::from_secs(30));
        assert_eq!(args.connect_timeout, Duration::from_secs(25));
        assert_eq!(args.barrier_timeout, Duration::from_secs(60));
        assert!(!args.automatic_reconnect);
        assert_eq!(args.on_broken_run, BrokenRunPolicy::Abort);
        assert_eq!(args.output_format, OutputFormat::Table);
    }

    #[test]
    fn positionals_and_flags_are_parsed() {
        let args = MqttBenchArgs::try_parse_from([
            "mqtt-bench",
            "workload.toml",
            "tcp://broker:1884",
            "-V",
            "--transport",
            "loopback",
            "--barrier-timeout",
            "1m 30s",
            "--on-broken-run",
            "skip",
            "--output-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.workload_file, Some(PathBuf::from("workload.toml")));
        assert_eq!(args.server_address(), "tcp://broker:1884");
        assert!(args.verbose);
        assert_eq!(args.transport(), BenchmarkTransport::Loopback);
        assert_eq!(args.barrier_timeout, Duration::from_secs(90));
        assert_eq!(args.on_broken_run, BrokenRunPolicy::Skip);
        assert_eq!(args.output_format, OutputFormat::Json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(MqttBenchArgs::try_parse_from(["mqtt-bench", "--max-inflight", "0"]).is_err());
        assert!(MqttBenchArgs::try_parse_from(["mqtt-bench", "--keep-alive", "500ms"]).is_err());
        assert!(MqttBenchArgs::try_parse_from(["mqtt-bench", "--transport", "quic"]).is_err());
    }

    #[test]
    fn missing_workload_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let args =
            MqttBenchArgs::try_parse_from(["mqtt-bench", missing.to_str().unwrap()]).unwrap();
        assert_eq!(args.workload_file(), None);

        let directory = MqttBenchArgs::try_parse_from(["mqtt-bench", dir.path().to_str().unwrap()])
            .unwrap();
        assert_eq!(directory.workload_file(), None);
    }
}
