pub mod connection;
pub mod publisher;
pub mod routing_key;

#[cfg(test)]
mod tests;

pub use connection::{Channel, Connector, LapinChannel, LapinConnector, Session};
pub use publisher::{DeliveryMode, Publishing};
pub use routing_key::{OmissionPolicy, ResolvedKey, RoutingDecision, DEFAULT_ROUTING_KEY};
