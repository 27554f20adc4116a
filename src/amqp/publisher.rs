use chrono::{DateTime, Utc};
use lapin::BasicProperties;
use tracing::trace;

use super::connection::Channel;
use crate::error::BrokerError;

/// AMQP delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient = 1,
    Persistent = 2,
}

/// Delivery attributes attached to every published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publishing {
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    pub mandatory: bool,
    pub immediate: bool,
}

impl Publishing {
    /// Persistent, priority zero, stamped with `timestamp`.
    pub fn persistent(timestamp: DateTime<Utc>) -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            priority: 0,
            timestamp,
            mandatory: false,
            immediate: false,
        }
    }

    pub fn to_basic_properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_delivery_mode(self.delivery_mode as u8)
            .with_priority(self.priority)
            .with_timestamp(self.timestamp.timestamp().max(0) as u64)
    }
}

/// Publishes `payload` once on `channel`.
///
/// Errors are returned untouched; recovery is the caller's decision.
pub async fn publish<Ch: Channel>(
    channel: &Ch,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
) -> Result<(), BrokerError> {
    let properties = Publishing::persistent(Utc::now());
    trace!(exchange, routing_key, bytes = payload.len(), "publishing record");
    channel
        .basic_publish(exchange, routing_key, payload, &properties)
        .await
}
