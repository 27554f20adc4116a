//! Error types and result handling for syslog-amqp.
//!
//! This module defines the main error type [`Error`], the broker-facing
//! [`BrokerError`], and a convenience [`Result`] type alias used throughout
//! the crate.
//!
//! # Example
//!
//! ```rust
//! use syslog_amqp::{Error, Result};
//!
//! fn pick_format(name: &str) -> Result<()> {
//!     Err(Error::UnsupportedFormat(name.to_string()))
//! }
//!
//! match pick_format("rfc9999") {
//!     Ok(()) => println!("Format accepted"),
//!     Err(Error::UnsupportedFormat(name)) => eprintln!("Unsupported: {}", name),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

use crate::resilience::FailureKind;
use crate::syslog::template::TemplateError;

/// The main error type for syslog-amqp operations.
///
/// Construction errors (`Config`, `UnsupportedFormat`, `TemplateCompile`,
/// `Broker` during the initial dial) stop the adapter before it starts.
/// Render failures are per-record and never escape the stream loop. `Fatal`
/// is the fail-stop outcome of exhausted recovery, and `Stopped` is returned
/// by any later attempt to stream through the same adapter.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid file or environment variable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configured syslog format variant is not recognized.
    #[error("unsupported syslog format: {0}")]
    UnsupportedFormat(String),

    /// A template source string failed to compile.
    #[error("Template compile error: {0}")]
    TemplateCompile(#[from] TemplateError),

    /// Broker connection, channel or publish error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Retry and reconnect were both exhausted.
    #[error("Fatal delivery error: {message}")]
    Fatal {
        /// Description of the last failure
        message: String,
    },

    /// The adapter already finished streaming and released its channel.
    #[error("adapter stopped: {0}")]
    Stopped(String),
}

/// Errors surfaced by the broker client.
///
/// The variant keeps the original cause so [`BrokerError::kind`] can inspect
/// the transport-layer error underneath it.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Error reported by the AMQP client library.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Raw transport error.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl BrokerError {
    /// Classifies this error for the resilience controller.
    pub fn kind(&self) -> FailureKind {
        match self {
            BrokerError::Io(e) => FailureKind::from_io(e.kind()),
            BrokerError::Amqp(lapin::Error::IOError(e)) => FailureKind::from_io(e.kind()),
            BrokerError::Amqp(e) => FailureKind::classify(e),
        }
    }
}

/// A convenient Result type alias for syslog-amqp operations.
///
/// This is equivalent to `std::result::Result<T, syslog_amqp::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
