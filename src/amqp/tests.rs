#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::BrokerConfig;
    use crate::error::BrokerError;
    use chrono::{TimeZone, Utc};
    use lapin::options::{BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
    use lapin::types::FieldTable;
    use lapin::ExchangeKind;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingChannel {
        id: u32,
        published: Mutex<Vec<(String, String, Vec<u8>, Publishing)>>,
        closed: Arc<Mutex<Vec<u32>>>,
    }

    impl Channel for RecordingChannel {
        async fn basic_publish(
            &self,
            exchange: &str,
            routing_key: &str,
            payload: &[u8],
            properties: &Publishing,
        ) -> Result<(), BrokerError> {
            self.published.lock().unwrap().push((
                exchange.to_string(),
                routing_key.to_string(),
                payload.to_vec(),
                properties.clone(),
            ));
            Ok(())
        }

        async fn close(&self) -> Result<(), BrokerError> {
            self.closed.lock().unwrap().push(self.id);
            Ok(())
        }
    }

    /// Fails the dials listed in `failing` (1-indexed), succeeds otherwise.
    struct FlakyConnector {
        dials: Arc<AtomicU32>,
        failing: Vec<u32>,
        closed: Arc<Mutex<Vec<u32>>>,
    }

    impl Connector for FlakyConnector {
        type Channel = RecordingChannel;

        async fn connect(&self) -> Result<RecordingChannel, BrokerError> {
            let dial = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.contains(&dial) {
                return Err(BrokerError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            Ok(RecordingChannel {
                id: dial,
                closed: Arc::clone(&self.closed),
                ..RecordingChannel::default()
            })
        }
    }

    fn flaky(failing: Vec<u32>) -> (FlakyConnector, Arc<AtomicU32>) {
        let dials = Arc::new(AtomicU32::new(0));
        (
            FlakyConnector {
                dials: Arc::clone(&dials),
                failing,
                closed: Arc::default(),
            },
            dials,
        )
    }

    #[test]
    fn test_persistent_publishing_attributes() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let publishing = Publishing::persistent(ts);

        assert_eq!(publishing.delivery_mode, DeliveryMode::Persistent);
        assert_eq!(publishing.priority, 0);
        assert!(!publishing.mandatory);
        assert!(!publishing.immediate);

        let props = publishing.to_basic_properties();
        assert_eq!(props.delivery_mode(), &Some(2));
        assert_eq!(props.priority(), &Some(0));
        assert_eq!(props.timestamp(), &Some(ts.timestamp() as u64));
    }

    #[tokio::test]
    async fn test_publish_passes_payload_through() {
        let channel = RecordingChannel::default();
        publisher::publish(&channel, "logspout", "app.logs", b"<14>1 line\n")
            .await
            .unwrap();

        let published = channel.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (exchange, routing_key, payload, properties) = &published[0];
        assert_eq!(exchange, "logspout");
        assert_eq!(routing_key, "app.logs");
        assert_eq!(payload, b"<14>1 line\n");
        assert_eq!(properties.delivery_mode, DeliveryMode::Persistent);
    }

    #[tokio::test]
    async fn test_reconnect_swaps_channel() {
        let (connector, dials) = flaky(vec![]);
        let mut session = Session::open(connector).await.unwrap();
        assert_eq!(session.channel().id, 1);

        session.reconnect().await.unwrap();
        assert_eq!(session.channel().id, 2);
        assert_eq!(session.generation(), 1);
        assert_eq!(dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_old_channel() {
        let (connector, dials) = flaky(vec![2]);
        let mut session = Session::open(connector).await.unwrap();

        let err = session.reconnect().await.unwrap_err();
        assert!(matches!(err, BrokerError::Io(_)));
        assert_eq!(session.channel().id, 1);
        assert_eq!(session.generation(), 0);

        session.reconnect().await.unwrap();
        assert_eq!(session.channel().id, 3);
        assert_eq!(dials.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reconnect_closes_replaced_channel() {
        let (connector, _) = flaky(vec![2]);
        let mut session = Session::open(connector).await.unwrap();

        session.reconnect().await.unwrap_err();
        assert!(session.connector().closed.lock().unwrap().is_empty());

        session.reconnect().await.unwrap();
        assert_eq!(*session.connector().closed.lock().unwrap(), vec![1]);

        session.close().await.unwrap();
        assert_eq!(*session.connector().closed.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_open_propagates_dial_failure() {
        let (connector, _) = flaky(vec![1]);
        assert!(Session::open(connector).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires running RabbitMQ
    async fn test_lapin_publish_roundtrip() {
        let broker = BrokerConfig {
            address: std::env::var("TEST_AMQP_ADDRESS").unwrap_or_else(|_| "localhost:5672".to_string()),
            exchange: format!("test_exchange_{}", std::process::id()),
            ..BrokerConfig::default()
        };
        let connector = LapinConnector::new(broker.amqp_uri(), broker.redacted_uri());
        let session = Session::open(connector).await.unwrap();
        let channel = session.channel().inner();

        channel
            .exchange_declare(
                &broker.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    auto_delete: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .unwrap();
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .unwrap();
        channel
            .queue_bind(
                queue.name().as_str(),
                &broker.exchange,
                "app.#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .unwrap();

        publisher::publish(session.channel(), &broker.exchange, "app.logs", b"hello\n")
            .await
            .unwrap();

        let mut consumer = channel
            .basic_consume(
                queue.name().as_str(),
                "test-consumer",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .unwrap();

        use futures::StreamExt;
        let delivery = tokio::time::timeout(std::time::Duration::from_secs(5), consumer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.data, b"hello\n");
        assert_eq!(delivery.routing_key.as_str(), "app.logs");
        assert_eq!(delivery.properties.delivery_mode(), &Some(2));
    }
}
