use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::amqp::connection::{Connector, LapinConnector, Session};
use crate::amqp::publisher;
use crate::amqp::routing_key::{self, OmissionPolicy, RoutingDecision};
use crate::resilience::{Recovery, ResilienceController, RetryPolicy};
use crate::syslog::format::TemplateStore;
use crate::syslog::hostname::HostIdentity;
use crate::syslog::render::{render, RecordProjection};
use crate::syslog::types::LogRecord;
use crate::{Config, Error, Result};

/// Counters reported when the record channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub received: u64,
    pub published: u64,
    pub render_failures: u64,
    pub routing_fallbacks: u64,
    pub omitted: u64,
    pub retried: u64,
    pub reconnected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Ready,
    Finished,
    Failed,
}

/// Forwards log records to an AMQP exchange as syslog lines.
///
/// An adapter streams once. When its loop ends, cleanly or with a fatal
/// error, the connection is closed and later calls to
/// [`stream`](Self::stream) fail without touching the record channel.
pub struct SyslogAmqpAdapter<C: Connector> {
    lifecycle: Lifecycle,
    session: Session<C>,
    exchange: String,
    templates: TemplateStore,
    projection: RecordProjection,
    omission: OmissionPolicy,
    controller: ResilienceController,
}

impl SyslogAmqpAdapter<LapinConnector> {
    /// Resolves the hostname and dials the broker described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let identity = HostIdentity::resolve(&config.syslog.host_file);
        let connector = LapinConnector::new(config.broker.amqp_uri(), config.broker.redacted_uri());
        info!(uri = %config.broker.redacted_uri(), "Connecting to AMQP broker");
        Self::with_connector(config, &identity, connector).await
    }
}

impl<C: Connector> SyslogAmqpAdapter<C> {
    /// Compiles the templates, then opens the first channel.
    ///
    /// Template errors are reported before the broker is dialed.
    pub async fn with_connector(config: &Config, identity: &HostIdentity, connector: C) -> Result<Self> {
        config.validate()?;
        let templates = TemplateStore::from_config(&config.syslog, &config.routing, identity)?;
        let projection = RecordProjection::new(
            identity.hostname(),
            config.syslog.append_tag.clone(),
            config.syslog.structured_data.as_deref(),
        );

        let session = Session::open(connector).await.map_err(|e| {
            error!(error = %e, "Initial AMQP connection failed");
            e
        })?;

        info!(
            exchange = %config.broker.exchange,
            format = %templates.format(),
            hostname = projection.hostname(),
            retry_count = config.retry.retry_count,
            "syslog-amqp adapter ready"
        );

        Ok(Self {
            lifecycle: Lifecycle::Ready,
            session,
            exchange: config.broker.exchange.clone(),
            templates,
            projection,
            omission: OmissionPolicy::from_config(&config.routing),
            controller: ResilienceController::new(RetryPolicy::from_config(&config.retry)),
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn hostname(&self) -> &str {
        self.projection.hostname()
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// True once the stream loop has ended, cleanly or not.
    pub fn is_stopped(&self) -> bool {
        self.lifecycle != Lifecycle::Ready
    }

    /// Consumes `records` until the channel closes or delivery fails fatally,
    /// then closes the broker connection.
    ///
    /// After a fatal error no further records are taken from `records`, by
    /// this call or any later one.
    #[instrument(skip_all, fields(exchange = %self.exchange))]
    pub async fn stream(&mut self, records: &mut mpsc::Receiver<LogRecord>) -> Result<StreamStats> {
        match self.lifecycle {
            Lifecycle::Ready => {}
            Lifecycle::Failed => {
                return Err(Error::Fatal {
                    message: "adapter already stopped after a fatal delivery error".to_string(),
                })
            }
            Lifecycle::Finished => {
                return Err(Error::Stopped("record stream already finished".to_string()))
            }
        }

        let mut stats = StreamStats::default();

        while let Some(record) = records.recv().await {
            stats.received += 1;
            if let Err(e) = self.forward(&record, &mut stats).await {
                error!(error = %e, received = stats.received, "syslog: stopping stream");
                self.lifecycle = Lifecycle::Failed;
                self.teardown().await;
                return Err(e);
            }
        }

        info!(
            received = stats.received,
            published = stats.published,
            omitted = stats.omitted,
            render_failures = stats.render_failures,
            "Record channel closed"
        );
        self.lifecycle = Lifecycle::Finished;
        self.teardown().await;
        Ok(stats)
    }

    async fn teardown(&self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "closing AMQP connection failed");
        }
    }

    async fn forward(&mut self, record: &LogRecord, stats: &mut StreamStats) -> Result<()> {
        let context = self.projection.project(record);

        let body = match render(&context, self.templates.body()) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, process = %record.process.name, "syslog: dropping record that failed to render");
                stats.render_failures += 1;
                return Ok(());
            }
        };

        let resolved = routing_key::resolve(&context, self.templates.routing_key());
        if resolved.used_fallback {
            stats.routing_fallbacks += 1;
        }
        let routing_key = match self.omission.decide(resolved) {
            RoutingDecision::Publish(key) => key,
            RoutingDecision::Omit(reason) => {
                debug!(reason = ?reason, "Record omitted");
                stats.omitted += 1;
                return Ok(());
            }
        };

        let published =
            publisher::publish(self.session.channel(), &self.exchange, &routing_key, &body).await;

        if let Err(failure) = published {
            warn!(
                routing_key = %routing_key,
                kind = ?failure.kind(),
                error = %failure,
                "amqp publish failed"
            );
            let recovery = self
                .controller
                .recover(&mut self.session, &self.exchange, &routing_key, &body, failure)
                .await?;
            match recovery {
                Recovery::SameConnection { .. } => stats.retried += 1,
                Recovery::Reconnected { .. } => stats.reconnected += 1,
            }
        }

        stats.published += 1;
        Ok(())
    }
}
