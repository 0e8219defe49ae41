use derive_more::derive::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, Default, Hash)]
pub enum BenchmarkTransport {
    #[default]
    #[display("MQTT")]
    #[serde(rename = "mqtt")]
    Mqtt,
    #[display("Loopback")]
    #[serde(rename = "loopback")]
    Loopback,
}
