use super::transport::BenchmarkTransport;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BenchmarkParams {
    pub transport: BenchmarkTransport,
    pub server_address: String,
    pub run_count: u32,
    pub timeout_secs: u64,
    pub groups: u32,
    pub publishers: u32,
    pub subscribers: u32,
    pub topics: u32,
    pub max_inflight: u32,
}

impl BenchmarkParams {
    pub fn format_actors_info(&self) -> String {
        match (self.publishers, self.subscribers) {
            (0, subscribers) => format!("{subscribers} Subscribers"),
            (publishers, 0) => format!("{publishers} Publishers"),
            (publishers, subscribers) => {
                format!("{publishers} Publishers/{subscribers} Subscribers")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actors_info_skips_missing_roles() {
        let mut params = BenchmarkParams {
            publishers: 2,
            subscribers: 3,
            ..Default::default()
        };
        assert_eq!(params.format_actors_info(), "2 Publishers/3 Subscribers");
        params.subscribers = 0;
        assert_eq!(params.format_actors_info(), "2 Publishers");
    }
}
