use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Workload configuration error: {0}")]
    Workload(#[from] WorkloadError),
    #[error("No workload file given, a sample workload was written to {0}")]
    SampleWorkloadWritten(PathBuf),
    #[error("Invalid server address: {0}")]
    InvalidServerAddress(String),
    #[error("Barrier broken in run {run}: {cause}")]
    BarrierBroken { run: u32, cause: BarrierError },
    #[error("Cannot serialize report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("Cannot read workload file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Invalid JSON workload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid TOML workload: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl WorkloadError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkloadError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cannot connect to {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Subscription to {topic} rejected by broker")]
    SubscriptionRejected { topic: String },
    #[error("Client request failed: {0}")]
    Request(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Delivery abandoned before acknowledgement")]
    DeliveryAbandoned,
    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BarrierError {
    #[error("barrier is broken")]
    Broken,
    #[error("timed out waiting for all parties")]
    TimedOut,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope too short: {0} bytes, at least 8 expected")]
    TooShort(usize),
}
