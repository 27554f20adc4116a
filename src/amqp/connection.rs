use lapin::options::BasicPublishOptions;
use lapin::{Connection, ConnectionProperties};
use std::future::Future;
use tracing::{debug, info, warn};

use super::publisher::Publishing;
use crate::error::BrokerError;

/// AMQP `reply-success` code sent with a normal connection close.
const CLOSE_REPLY_SUCCESS: u16 = 200;

/// An open broker channel that can publish messages.
pub trait Channel: Send + Sync {
    fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &Publishing,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Closes the channel and the connection that carries it.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Dials the broker and opens a channel on the new connection.
pub trait Connector: Send + Sync {
    type Channel: Channel;

    fn connect(&self) -> impl Future<Output = Result<Self::Channel, BrokerError>> + Send;
}

/// The live connection/channel pair of an adapter.
///
/// Only the owner ever replaces the channel, and only with one that opened
/// successfully.
pub struct Session<C: Connector> {
    connector: C,
    channel: C::Channel,
    generation: u64,
}

impl<C: Connector> Session<C> {
    /// Dials the broker for the first time.
    pub async fn open(connector: C) -> Result<Self, BrokerError> {
        let channel = connector.connect().await?;
        info!("AMQP channel opened");
        Ok(Self {
            connector,
            channel,
            generation: 0,
        })
    }

    pub fn channel(&self) -> &C::Channel {
        &self.channel
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of successful reconnects since the session was opened.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Dials a fresh connection and channel, swapping them in on success.
    ///
    /// On failure the current channel is left in place. The replaced channel
    /// is closed after the swap; a close failure is logged, not returned.
    pub async fn reconnect(&mut self) -> Result<(), BrokerError> {
        let channel = self.connector.connect().await?;
        let previous = std::mem::replace(&mut self.channel, channel);
        self.generation += 1;
        debug!(generation = self.generation, "AMQP channel replaced");

        if let Err(e) = previous.close().await {
            warn!(error = %e, "closing replaced AMQP connection failed");
        }
        Ok(())
    }

    /// Closes the current channel and its connection.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close().await?;
        info!(generation = self.generation, "AMQP connection closed");
        Ok(())
    }
}

/// Connector backed by the lapin AMQP client.
#[derive(Clone)]
pub struct LapinConnector {
    uri: String,
    redacted_uri: String,
    properties: ConnectionProperties,
}

impl LapinConnector {
    pub fn new(uri: impl Into<String>, redacted_uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            redacted_uri: redacted_uri.into(),
            properties: ConnectionProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }
}

impl Connector for LapinConnector {
    type Channel = LapinChannel;

    async fn connect(&self) -> Result<LapinChannel, BrokerError> {
        debug!(uri = %self.redacted_uri, "Dialing AMQP broker");
        let connection = Connection::connect(&self.uri, self.properties.clone())
            .await
            .map_err(|e| {
                warn!(uri = %self.redacted_uri, error = %e, "amqp dial failed");
                e
            })?;

        let channel = connection.create_channel().await.map_err(|e| {
            warn!(error = %e, "opening AMQP channel failed");
            e
        })?;

        Ok(LapinChannel {
            connection,
            channel,
        })
    }
}

/// A lapin channel together with the connection that owns it.
pub struct LapinChannel {
    connection: Connection,
    channel: lapin::Channel,
}

impl LapinChannel {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn inner(&self) -> &lapin::Channel {
        &self.channel
    }
}

impl Channel for LapinChannel {
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &Publishing,
    ) -> Result<(), BrokerError> {
        let options = BasicPublishOptions {
            mandatory: properties.mandatory,
            immediate: properties.immediate,
        };

        // The returned confirm is dropped: delivery acknowledgements are not tracked.
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                options,
                payload,
                properties.to_basic_properties(),
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(CLOSE_REPLY_SUCCESS, "syslog-amqp closing").await?;
        Ok(())
    }
}
