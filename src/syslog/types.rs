use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata of the process that emitted a record.
///
/// Shared between every record the process produces, so records hold it
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ProcessInfo {
    pub fn new(name: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
            hostname: String::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Process name as shown in the syslog tag.
    ///
    /// Container runtimes report names with a leading `/`; one is stripped.
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }
}

/// One log event from the upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub data: String,
    pub time: DateTime<FixedOffset>,
    pub source: String,
    pub process: Arc<ProcessInfo>,
}

impl LogRecord {
    pub fn new(
        data: impl Into<String>,
        time: DateTime<FixedOffset>,
        source: impl Into<String>,
        process: Arc<ProcessInfo>,
    ) -> Self {
        Self {
            data: data.into(),
            time,
            source: source.into(),
            process,
        }
    }
}
