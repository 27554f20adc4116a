use tracing::{debug, warn};

use crate::config::RoutingConfig;
use crate::syslog::render::{render, RenderContext};
use crate::syslog::template::Template;

/// Routing key used when the routing-key template fails to execute.
pub const DEFAULT_ROUTING_KEY: &str = "default";

/// A routing key rendered for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: String,
    pub used_fallback: bool,
}

/// Executes the routing-key template, falling back to [`DEFAULT_ROUTING_KEY`].
pub fn resolve(context: &RenderContext, template: &Template) -> ResolvedKey {
    match render(context, template) {
        Ok(bytes) => ResolvedKey {
            key: String::from_utf8_lossy(&bytes).into_owned(),
            used_fallback: false,
        },
        Err(e) => {
            warn!(
                error = %e,
                "Error executing routing key template, using \"default\" as the routing key"
            );
            ResolvedKey {
                key: DEFAULT_ROUTING_KEY.to_string(),
                used_fallback: true,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmitReason {
    EmptyKey,
    DefaultKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Publish(String),
    Omit(OmitReason),
}

/// Which routing keys cause a record to be dropped instead of published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmissionPolicy {
    pub omit_empty: bool,
    pub omit_default: bool,
}

impl Default for OmissionPolicy {
    fn default() -> Self {
        Self {
            omit_empty: true,
            omit_default: true,
        }
    }
}

impl OmissionPolicy {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            omit_empty: config.omit_with_empty_routing_key,
            omit_default: config.omit_with_default_routing_key,
        }
    }

    pub fn decide(&self, resolved: ResolvedKey) -> RoutingDecision {
        if resolved.key.is_empty() && self.omit_empty {
            debug!("Omitting record with empty routing key");
            return RoutingDecision::Omit(OmitReason::EmptyKey);
        }
        if resolved.key == DEFAULT_ROUTING_KEY && self.omit_default {
            debug!(fallback = resolved.used_fallback, "Omitting record with default routing key");
            return RoutingDecision::Omit(OmitReason::DefaultKey);
        }
        RoutingDecision::Publish(resolved.key)
    }
}
