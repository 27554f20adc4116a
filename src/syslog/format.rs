//! Template store: compiles the syslog body and routing-key templates.

use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::hostname::HostIdentity;
use super::render::structured_data_block;
use super::template::Template;
use crate::config::{RoutingConfig, SyslogConfig};
use crate::{Error, Result};

/// Wire layout of the rendered syslog line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyslogFormat {
    #[default]
    Rfc5424,
    Rfc3164,
}

impl FromStr for SyslogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rfc5424" => Ok(SyslogFormat::Rfc5424),
            "rfc3164" => Ok(SyslogFormat::Rfc3164),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SyslogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyslogFormat::Rfc5424 => f.write_str("rfc5424"),
            SyslogFormat::Rfc3164 => f.write_str("rfc3164"),
        }
    }
}

/// Template expressions for each field of the syslog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExpressions {
    pub priority: String,
    pub timestamp: String,
    pub hostname: String,
    pub tag: String,
    pub pid: String,
    pub structured_data: Option<String>,
    pub data: String,
}

impl Default for FieldExpressions {
    fn default() -> Self {
        Self {
            priority: "{{.Priority}}".to_string(),
            timestamp: "{{.Timestamp}}".to_string(),
            hostname: "{{.ProcessHostname}}".to_string(),
            tag: "{{.Tag}}".to_string(),
            pid: "{{.Pid}}".to_string(),
            structured_data: None,
            data: "{{.Data}}".to_string(),
        }
    }
}

impl FieldExpressions {
    /// Builds the expressions from configuration.
    ///
    /// A hostname read from the host identity file overrides the configured
    /// hostname expression.
    pub fn from_config(config: &SyslogConfig, identity: &HostIdentity) -> Self {
        let defaults = Self::default();
        let hostname = if identity.is_from_host_file() {
            "{{.Hostname}}".to_string()
        } else {
            config.hostname.clone().unwrap_or(defaults.hostname)
        };

        Self {
            priority: config.priority.clone(),
            timestamp: config.timestamp.clone(),
            hostname,
            tag: config.tag.clone().unwrap_or(defaults.tag),
            pid: config.pid.clone(),
            structured_data: config.structured_data.clone(),
            data: config.data.clone(),
        }
    }
}

impl SyslogFormat {
    /// Template source for this layout with `fields` spliced in.
    pub fn layout(self, fields: &FieldExpressions) -> String {
        match self {
            SyslogFormat::Rfc5424 => format!(
                "<{}>1 {} {} {} {} - {} {}\n",
                fields.priority,
                fields.timestamp,
                fields.hostname,
                fields.tag,
                fields.pid,
                structured_data_block(fields.structured_data.as_deref()),
                fields.data
            ),
            SyslogFormat::Rfc3164 => format!(
                "<{}>{} {} {}[{}]: {}\n",
                fields.priority, fields.timestamp, fields.hostname, fields.tag, fields.pid, fields.data
            ),
        }
    }
}

/// The two long-lived templates an adapter renders with.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    format: SyslogFormat,
    body: Template,
    routing_key: Template,
}

impl TemplateStore {
    /// Compiles the body template for `format` and the routing-key template.
    pub fn compile(format: &str, fields: &FieldExpressions, routing_key: &str) -> Result<Self> {
        let format: SyslogFormat = format.parse()?;
        let source = format.layout(fields);
        debug!(format = %format, template = %source.trim_end(), "Compiling syslog template");

        let body = Template::parse("syslog", &source)?;
        let routing_key = Template::parse("AMQP_ROUTING_KEY", routing_key)?;

        Ok(Self {
            format,
            body,
            routing_key,
        })
    }

    pub fn from_config(
        syslog: &SyslogConfig,
        routing: &RoutingConfig,
        identity: &HostIdentity,
    ) -> Result<Self> {
        let fields = FieldExpressions::from_config(syslog, identity);
        Self::compile(&syslog.format, &fields, &routing.key)
    }

    pub fn format(&self) -> SyslogFormat {
        self.format
    }

    pub fn body(&self) -> &Template {
        &self.body
    }

    pub fn routing_key(&self) -> &Template {
        &self.routing_key
    }
}
