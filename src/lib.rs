pub mod adapter;
pub mod config;
pub mod error;
pub mod resilience;

pub mod amqp;
pub mod syslog;

pub use adapter::{StreamStats, SyslogAmqpAdapter};
pub use crate::config::Config;
pub use error::{BrokerError, Error, Result};
pub use syslog::{LogRecord, ProcessInfo};
