//! Recovery from failed publishes.
//!
//! A failed publish is classified into a [`FailureKind`]. Transient failures
//! are retried on the current channel; everything else, and transient
//! failures whose retries run out, triggers a reconnect followed by another
//! round of publish retries. If reconnecting never succeeds, or publishing
//! still fails on the fresh channel, recovery ends in [`Error::Fatal`].
//!
//! Every retry loop makes at most `retry_count` attempts and sleeps
//! `2^n * 10` backoff units before attempt `n`. There is no ceiling on the
//! per-attempt delay.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::amqp::connection::{Connector, Session};
use crate::amqp::publisher;
use crate::config::RetryConfig;
use crate::error::BrokerError;
use crate::{Error, Result};

/// Transport-level classification of a publish failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    TemporaryOther,
    ConnectionReset,
    Permanent,
}

impl FailureKind {
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::ConnectionReset => FailureKind::ConnectionReset,
            io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted => {
                FailureKind::TemporaryOther
            }
            _ => FailureKind::Permanent,
        }
    }

    /// Walks the `source()` chain looking for an I/O error to classify.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                return Self::from_io(io_err.kind());
            }
            current = e.source();
        }
        FailureKind::Permanent
    }

    /// A reset connection is never retried in place.
    pub fn retry_on_same_connection(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::TemporaryOther)
    }
}

/// Attempt cap and backoff schedule shared by every retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    unit: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, unit: Duration) -> Self {
        Self { retry_count, unit }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.retry_count, config.backoff_unit())
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delay before attempt `attempt` (1-indexed): `2^attempt * 10` units.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt)
            .map_or(u64::MAX, |f| f.saturating_mul(10));
        let nanos = self.unit.as_nanos().saturating_mul(u128::from(factor));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// `(attempt, delay)` pairs for one retry loop.
    pub fn schedule(&self) -> impl Iterator<Item = (u32, Duration)> + '_ {
        (1..=self.retry_count).map(move |attempt| (attempt, self.delay_for(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// How a failed publish was eventually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Delivered on the original channel after `attempts` retries.
    SameConnection { attempts: u32 },
    /// Delivered on a new channel after `reconnect_attempts` dials and
    /// `attempts` publish retries.
    Reconnected { reconnect_attempts: u32, attempts: u32 },
}

/// Drives retry and reconnect for one failed publish.
#[derive(Debug, Clone, Default)]
pub struct ResilienceController {
    policy: RetryPolicy,
}

impl ResilienceController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn recover<C: Connector>(
        &self,
        session: &mut Session<C>,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        failure: BrokerError,
    ) -> Result<Recovery> {
        let kind = failure.kind();

        if kind.retry_on_same_connection() {
            info!(
                kind = ?kind,
                retry_count = self.policy.retry_count,
                "syslog: retrying amqp publish on current connection"
            );
            match self.retry_publish(session, exchange, routing_key, payload).await {
                Ok(attempts) => {
                    info!(attempts, "syslog: retry successful");
                    return Ok(Recovery::SameConnection { attempts });
                }
                Err(last) => warn!(
                    error = %describe(last.as_ref(), &failure),
                    "syslog: retry failed, reconnecting"
                ),
            }
        } else {
            debug!(kind = ?kind, error = %failure, "syslog: publish failure requires reconnect");
        }

        let reconnect_attempts = self.reconnect(session).await?;

        match self.retry_publish(session, exchange, routing_key, payload).await {
            Ok(attempts) => {
                info!(reconnect_attempts, attempts, "syslog: reconnect successful");
                Ok(Recovery::Reconnected {
                    reconnect_attempts,
                    attempts,
                })
            }
            Err(last) => {
                let message = describe(last.as_ref(), &failure);
                error!(error = %message, "syslog: publish failed after reconnect");
                Err(Error::Fatal { message })
            }
        }
    }

    async fn retry_publish<C: Connector>(
        &self,
        session: &Session<C>,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> std::result::Result<u32, Option<BrokerError>> {
        let mut last = None;
        for (attempt, delay) in self.policy.schedule() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before publish retry");
            sleep(delay).await;
            match publisher::publish(session.channel(), exchange, routing_key, payload).await {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!(attempt, kind = ?e.kind(), error = %e, "amqp publish retry failed");
                    last = Some(e);
                }
            }
        }
        Err(last)
    }

    async fn reconnect<C: Connector>(&self, session: &mut Session<C>) -> Result<u32> {
        info!(retry_count = self.policy.retry_count, "syslog: reconnecting");
        let mut last = None;
        for (attempt, delay) in self.policy.schedule() {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            sleep(delay).await;
            match session.reconnect().await {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!(attempt, error = %e, "amqp reconnect failed");
                    last = Some(e);
                }
            }
        }

        let message = match last {
            Some(e) => format!("reconnect failed after {} attempts: {}", self.policy.retry_count, e),
            None => "reconnect not attempted: retry count is zero".to_string(),
        };
        error!(error = %message, "syslog: giving up on broker");
        Err(Error::Fatal { message })
    }
}

fn describe(last: Option<&BrokerError>, original: &BrokerError) -> String {
    match last {
        Some(e) => e.to_string(),
        None => original.to_string(),
    }
}
