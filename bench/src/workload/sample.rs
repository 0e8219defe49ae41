use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const SAMPLE_FILE_NAME: &str = "sample.json";

const SAMPLE_WORKLOAD: &str = r#"{
  "runCount": 10,
  "timeout": 30,
  "configs": [
    {
      "size": 1,
      "qos": 0,
      "topic": "/"
    },
    {
      "size": 1,
      "qos": 0,
      "topic": "/",
      "payload": "hello"
    }
  ]
}
"#;

/// Writes the sample workload into `dir`, replacing any previous sample.
pub fn write_sample(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join(SAMPLE_FILE_NAME);
    fs::write(&path, SAMPLE_WORKLOAD)?;
    Ok(path)
}
