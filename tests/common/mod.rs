#![allow(dead_code)]

use chrono::DateTime;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syslog_amqp::amqp::{Channel, Connector, Publishing};
use syslog_amqp::syslog::HostIdentity;
use syslog_amqp::{BrokerError, Config, LogRecord, ProcessInfo, SyslogAmqpAdapter};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const TIMESTAMP: &str = "2024-03-01T12:00:00Z";

/// Something the mock broker observed, timed from broker creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect { ok: bool, at: Duration },
    Publish { channel: u32, ok: bool, at: Duration },
}

#[derive(Debug, Clone)]
pub struct Delivered {
    pub channel: u32,
    pub exchange: String,
    pub routing_key: String,
    pub payload: String,
    pub properties: Publishing,
}

#[derive(Default)]
struct State {
    publish_failures: VecDeque<io::ErrorKind>,
    connect_failures: VecDeque<io::ErrorKind>,
    dials: u32,
    events: Vec<Event>,
    delivered: Vec<Delivered>,
    closed: Vec<u32>,
}

/// In-memory broker whose publish and dial outcomes are scripted.
///
/// Queued failures are consumed in order; once a queue is empty the
/// operation succeeds.
#[derive(Clone)]
pub struct MockBroker {
    state: Arc<Mutex<State>>,
    started: Instant,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            started: Instant::now(),
        }
    }

    pub fn fail_publishes(&self, kinds: &[io::ErrorKind]) {
        self.state.lock().unwrap().publish_failures.extend(kinds.iter().copied());
    }

    pub fn fail_connects(&self, count: usize, kind: io::ErrorKind) {
        let mut state = self.state.lock().unwrap();
        state.connect_failures.extend(std::iter::repeat(kind).take(count));
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            broker: self.clone(),
        }
    }

    pub fn dials(&self) -> u32 {
        self.state.lock().unwrap().dials
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Events after the initial successful dial.
    pub fn events_after_open(&self) -> Vec<Event> {
        self.events().into_iter().skip(1).collect()
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.state.lock().unwrap().delivered.clone()
    }

    /// Ids of the channels closed so far, in close order.
    pub fn closed(&self) -> Vec<u32> {
        self.state.lock().unwrap().closed.clone()
    }

    fn elapsed(&self) -> Duration {
        Instant::now() - self.started
    }
}

pub struct MockConnector {
    broker: MockBroker,
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    async fn connect(&self) -> Result<MockChannel, BrokerError> {
        let at = self.broker.elapsed();
        let mut state = self.broker.state.lock().unwrap();
        state.dials += 1;
        match state.connect_failures.pop_front() {
            Some(kind) => {
                state.events.push(Event::Connect { ok: false, at });
                Err(BrokerError::Io(io::Error::new(kind, "dial failed")))
            }
            None => {
                state.events.push(Event::Connect { ok: true, at });
                Ok(MockChannel {
                    id: state.dials,
                    broker: self.broker.clone(),
                })
            }
        }
    }
}

pub struct MockChannel {
    id: u32,
    broker: MockBroker,
}

impl Channel for MockChannel {
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &Publishing,
    ) -> Result<(), BrokerError> {
        let at = self.broker.elapsed();
        let mut state = self.broker.state.lock().unwrap();
        match state.publish_failures.pop_front() {
            Some(kind) => {
                state.events.push(Event::Publish {
                    channel: self.id,
                    ok: false,
                    at,
                });
                Err(BrokerError::Io(io::Error::new(kind, "publish failed")))
            }
            None => {
                state.events.push(Event::Publish {
                    channel: self.id,
                    ok: true,
                    at,
                });
                state.delivered.push(Delivered {
                    channel: self.id,
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    payload: String::from_utf8_lossy(payload).into_owned(),
                    properties: properties.clone(),
                });
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.broker.state.lock().unwrap().closed.push(self.id);
        Ok(())
    }
}

/// Configuration that renders `Hostname` as `h` and routes to `app.logs`.
pub fn test_config(retry_count: u32) -> Config {
    let mut config = Config::default();
    config.syslog.hostname = Some("{{.Hostname}}".to_string());
    config.routing.key = "app.logs".to_string();
    config.retry.retry_count = retry_count;
    config.channel_capacity = 16;
    config
}

pub fn identity() -> HostIdentity {
    HostIdentity::from_os("h")
}

pub fn process() -> ProcessInfo {
    ProcessInfo::new("/app", 42).with_hostname("container-host")
}

pub fn record(data: &str, source: &str) -> LogRecord {
    record_from(process(), data, source)
}

pub fn record_with_labels(data: &str, labels: &[(&str, &str)]) -> LogRecord {
    let process = labels
        .iter()
        .fold(process(), |p, (k, v)| p.with_label(*k, *v));
    record_from(process, data, "stdout")
}

fn record_from(process: ProcessInfo, data: &str, source: &str) -> LogRecord {
    LogRecord::new(
        data,
        DateTime::parse_from_rfc3339(TIMESTAMP).unwrap(),
        source,
        Arc::new(process),
    )
}

pub async fn adapter(config: &Config, broker: &MockBroker) -> SyslogAmqpAdapter<MockConnector> {
    SyslogAmqpAdapter::with_connector(config, &identity(), broker.connector())
        .await
        .unwrap()
}

/// A receiver pre-filled with `records` whose sender is already dropped.
pub fn closed_channel(records: Vec<LogRecord>) -> mpsc::Receiver<LogRecord> {
    let (tx, rx) = mpsc::channel(records.len().max(1));
    for record in records {
        tx.try_send(record).unwrap();
    }
    rx
}

pub fn remaining(rx: &mut mpsc::Receiver<LogRecord>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
