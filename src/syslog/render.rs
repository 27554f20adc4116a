use bytes::Bytes;
use chrono::SecondsFormat;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use super::template::{Fields, RenderError, Template, Value};
use super::types::LogRecord;

/// Syslog facility codes used by the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    User = 1,
    Daemon = 3,
}

/// Syslog severity codes used by the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error = 3,
    Info = 6,
}

/// Syslog priority: facility and severity combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub facility: Facility,
    pub severity: Severity,
}

impl Priority {
    /// Maps a record's origin stream to a priority.
    pub fn from_source(source: &str) -> Self {
        let (facility, severity) = match source {
            "stdout" => (Facility::User, Severity::Info),
            "stderr" => (Facility::User, Severity::Error),
            _ => (Facility::Daemon, Severity::Info),
        };
        Self { facility, severity }
    }

    pub fn code(self) -> u8 {
        (self.facility as u8) * 8 + self.severity as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Formats the structured-data element of a syslog line.
///
/// An unset or empty value renders as the nil value `-`.
pub fn structured_data_block(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!("[{}]", v),
        _ => "-".to_string(),
    }
}

/// Settings shared by every projection an adapter performs.
#[derive(Debug, Clone)]
pub struct RecordProjection {
    hostname: Arc<str>,
    tag_suffix: String,
    structured_data: String,
}

impl RecordProjection {
    pub fn new(hostname: Arc<str>, tag_suffix: impl Into<String>, structured_data: Option<&str>) -> Self {
        Self {
            hostname,
            tag_suffix: tag_suffix.into(),
            structured_data: structured_data_block(structured_data),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Projects a record into the fields templates can reference.
    pub fn project(&self, record: &LogRecord) -> RenderContext {
        let process = &record.process;
        let mut fields = Fields::new();

        fields.insert("Priority", text(Priority::from_source(&record.source)));
        fields.insert("Hostname", text(&self.hostname));
        // Records without a process hostname fall back to the host identity.
        let process_hostname = if process.hostname.is_empty() {
            &*self.hostname
        } else {
            process.hostname.as_str()
        };
        fields.insert("ProcessHostname", text(process_hostname));
        fields.insert("ProcessName", text(process.display_name()));
        fields.insert(
            "Tag",
            Value::Text(format!("{}{}", process.display_name(), self.tag_suffix)),
        );
        fields.insert("Pid", text(process.pid));
        fields.insert(
            "Timestamp",
            Value::Text(record.time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        fields.insert("StructuredData", text(&self.structured_data));
        fields.insert("Source", text(&record.source));
        fields.insert("Data", text(&record.data));
        fields.insert("Labels", Value::Map(process.labels.clone()));

        RenderContext { fields }
    }
}

fn text(value: impl fmt::Display) -> Value {
    Value::Text(value.to_string())
}

/// Plain field mapping derived from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    fields: Fields,
}

impl RenderContext {
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Executes `template` against a projected record.
pub fn render(context: &RenderContext, template: &Template) -> Result<Bytes, RenderError> {
    let rendered = template.render(&context.fields)?;
    trace!(template = template.name(), bytes = rendered.len(), "rendered record");
    Ok(rendered)
}
