mod sample;

use crate::error::WorkloadError;
use crate::transport::QualityOfService;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

pub use sample::write_sample;

pub const DEFAULT_RUN_COUNT: NonZeroU32 = nonzero_lit::u32!(10);
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const ROOT_TOPIC: &str = "/";

/// Immutable description of the benchmark: how often to repeat it, how long
/// each repetition lasts and which worker groups take part.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    run_count: NonZeroU32,
    timeout: Duration,
    groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    /// Number of concurrent workers spawned for this group.
    pub size: NonZeroU32,
    pub qos: QualityOfService,
    pub topic: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Publisher { payload: Bytes },
    Subscriber,
}

impl Role {
    pub fn is_publisher(&self) -> bool {
        matches!(self, Role::Publisher { .. })
    }
}

impl GroupSpec {
    pub fn publisher(size: NonZeroU32, qos: QualityOfService, topic: &str, payload: &str) -> Self {
        Self {
            size,
            qos,
            topic: normalize_topic(topic),
            role: Role::Publisher {
                payload: Bytes::copy_from_slice(payload.as_bytes()),
            },
        }
    }

    pub fn subscriber(size: NonZeroU32, qos: QualityOfService, topic: &str) -> Self {
        Self {
            size,
            qos,
            topic: normalize_topic(topic),
            role: Role::Subscriber,
        }
    }

    /// Topic as seen by the broker, `prefix` is the namespace shared by every worker.
    pub fn full_topic(&self, prefix: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        if self.topic.starts_with('/') {
            format!("{prefix}{}", self.topic)
        } else {
            format!("{prefix}/{}", self.topic)
        }
    }
}

fn normalize_topic(topic: &str) -> String {
    if topic.is_empty() {
        ROOT_TOPIC.to_owned()
    } else {
        topic.to_owned()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WorkloadFile {
    #[serde(default = "default_run_count")]
    run_count: u32,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(alias = "groups")]
    configs: Vec<GroupFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupFile {
    size: u32,
    qos: u8,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

fn default_run_count() -> u32 {
    DEFAULT_RUN_COUNT.get()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl WorkloadSpec {
    pub fn new(
        run_count: u32,
        timeout_secs: u64,
        groups: Vec<GroupSpec>,
    ) -> Result<Self, WorkloadError> {
        let run_count = NonZeroU32::new(run_count)
            .ok_or_else(|| WorkloadError::invalid("runCount", "must be at least 1"))?;
        if timeout_secs == 0 {
            return Err(WorkloadError::invalid("timeout", "must be greater than 0"));
        }
        if groups.is_empty() {
            return Err(WorkloadError::invalid(
                "configs",
                "at least one group is required",
            ));
        }
        for (index, group) in groups.iter().enumerate() {
            if group.role.is_publisher() && group.topic.contains(['+', '#']) {
                return Err(WorkloadError::invalid(
                    format!("configs[{index}].topic"),
                    "publishers cannot use wildcard topics",
                ));
            }
        }
        Ok(Self {
            run_count,
            timeout: Duration::from_secs(timeout_secs),
            groups,
        })
    }

    /// Loads a workload, TOML when the file extension says so and JSON otherwise.
    pub fn load(path: &Path) -> Result<Self, WorkloadError> {
        let content = fs::read_to_string(path).map_err(|source| WorkloadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, WorkloadError> {
        let file: WorkloadFile = serde_json::from_str(content)?;
        Self::try_from(file)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, WorkloadError> {
        let file: WorkloadFile = toml::from_str(content)?;
        Self::try_from(file)
    }

    pub fn run_count(&self) -> u32 {
        self.run_count.get()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    pub fn total_workers(&self) -> usize {
        self.groups.iter().map(|g| g.size.get() as usize).sum()
    }

    pub fn publishers(&self) -> u32 {
        self.count_workers(|g| g.role.is_publisher())
    }

    pub fn subscribers(&self) -> u32 {
        self.count_workers(|g| !g.role.is_publisher())
    }

    pub fn distinct_topics(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.topic.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn count_workers(&self, filter: impl Fn(&GroupSpec) -> bool) -> u32 {
        self.groups
            .iter()
            .filter(|g| filter(g))
            .map(|g| g.size.get())
            .sum()
    }
}

impl TryFrom<WorkloadFile> for WorkloadSpec {
    type Error = WorkloadError;

    fn try_from(file: WorkloadFile) -> Result<Self, Self::Error> {
        let mut groups = Vec::with_capacity(file.configs.len());
        for (index, group) in file.configs.into_iter().enumerate() {
            let size = NonZeroU32::new(group.size).ok_or_else(|| {
                WorkloadError::invalid(format!("configs[{index}].size"), "must be at least 1")
            })?;
            let qos = QualityOfService::try_from(group.qos).map_err(|_| {
                WorkloadError::invalid(format!("configs[{index}].qos"), "must be 0, 1 or 2")
            })?;
            let topic = group.topic.as_deref().unwrap_or(ROOT_TOPIC);
            groups.push(match group.payload {
                Some(payload) => GroupSpec::publisher(size, qos, topic, &payload),
                None => GroupSpec::subscriber(size, qos, topic),
            });
        }
        WorkloadSpec::new(file.run_count, file.timeout, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_presence_selects_the_role() {
        let workload = WorkloadSpec::from_json_str(
            r#"{
                "runCount": 2,
                "timeout": 5,
                "configs": [
                    { "size": 3, "qos": 1, "topic": "/a" },
                    { "size": 2, "qos": 0, "topic": "/a", "payload": "hello" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(workload.run_count(), 2);
        assert_eq!(workload.timeout(), Duration::from_secs(5));
        assert_eq!(workload.groups()[0].role, Role::Subscriber);
        assert_eq!(
            workload.groups()[1].role,
            Role::Publisher {
                payload: Bytes::from_static(b"hello")
            }
        );
        assert_eq!(workload.total_workers(), 5);
        assert_eq!(workload.publishers(), 2);
        assert_eq!(workload.subscribers(), 3);
        assert_eq!(workload.distinct_topics(), 1);
    }

    #[test]
    fn defaults_are_applied() {
        let workload =
            WorkloadSpec::from_json_str(r#"{ "configs": [ { "size": 1, "qos": 0 } ] }"#).unwrap();
        assert_eq!(workload.run_count(), 10);
        assert_eq!(workload.timeout(), Duration::from_secs(30));
        assert_eq!(workload.groups()[0].topic, "/");
    }

    #[test]
    fn empty_payload_is_still_a_publisher() {
        let workload = WorkloadSpec::from_json_str(
            r#"{ "configs": [ { "size": 1, "qos": 0, "payload": "" } ] }"#,
        )
        .unwrap();
        assert!(workload.groups()[0].role.is_publisher());
    }

    #[test]
    fn toml_workloads_are_supported() {
        let workload = WorkloadSpec::from_toml_str(
            r#"
            runCount = 1
            timeout = 2

            [[groups]]
            size = 4
            qos = 2
            topic = "/t"
            "#,
        )
        .unwrap();
        assert_eq!(workload.total_workers(), 4);
        assert_eq!(workload.groups()[0].qos, QualityOfService::ExactlyOnce);
    }

    #[test]
    fn invalid_values_name_the_offending_field() {
        let cases = [
            (r#"{ "runCount": 0, "configs": [ { "size": 1, "qos": 0 } ] }"#, "runCount"),
            (r#"{ "timeout": 0, "configs": [ { "size": 1, "qos": 0 } ] }"#, "timeout"),
            (r#"{ "configs": [] }"#, "configs"),
            (r#"{ "configs": [ { "size": 0, "qos": 0 } ] }"#, "configs[0].size"),
            (
                r#"{ "configs": [ { "size": 1, "qos": 0 }, { "size": 1, "qos": 3 } ] }"#,
                "configs[1].qos",
            ),
            (
                r##"{ "configs": [ { "size": 1, "qos": 0, "topic": "/a/#", "payload": "x" } ] }"##,
                "configs[0].topic",
            ),
        ];
        for (json, expected_field) in cases {
            match WorkloadSpec::from_json_str(json) {
                Err(WorkloadError::InvalidField { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected invalid {expected_field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = WorkloadSpec::from_json_str(
            r#"{ "configs": [ { "size": 1, "qos": 0, "retain": true } ] }"#,
        );
        assert!(matches!(result, Err(WorkloadError::Json(_))));
    }

    #[test]
    fn subscriber_filters_may_use_wildcards() {
        let workload = WorkloadSpec::from_json_str(
            r##"{ "configs": [ { "size": 1, "qos": 0, "topic": "/a/#" } ] }"##,
        );
        assert!(workload.is_ok());
    }

    #[test]
    fn full_topic_joins_prefix_and_topic() {
        let one = nonzero_lit::u32!(1);
        let root = GroupSpec::subscriber(one, QualityOfService::AtMostOnce, "");
        let nested = GroupSpec::subscriber(one, QualityOfService::AtMostOnce, "sensors/1");
        assert_eq!(root.full_topic("/bench"), "/bench/");
        assert_eq!(nested.full_topic("/bench/"), "/bench/sensors/1");
        assert_eq!(nested.full_topic(""), "/sensors/1");
    }
}
