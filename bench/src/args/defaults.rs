use std::num::NonZeroU16;

pub const DEFAULT_SERVER_ADDRESS: &str = "tcp://127.0.0.1:1883";
pub const DEFAULT_VERBOSE: bool = false;
pub const DEFAULT_TOPIC_PREFIX: &str = "/mqtt-bench";
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "mqtt-client";
pub const DEFAULT_MAX_INFLIGHT: NonZeroU16 = nonzero_lit::u16!(10);
pub const DEFAULT_KEEP_ALIVE: &str = "30s";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "25s";
pub const DEFAULT_BARRIER_TIMEOUT: &str = "60s";
pub const DEFAULT_AUTOMATIC_RECONNECT: bool = false;
