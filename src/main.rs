use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use syslog_amqp::{Config, LogRecord, SyslogAmqpAdapter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "syslog-amqp")]
#[command(about = "Forwards JSON log records from stdin to an AMQP exchange as syslog lines", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    init_logging(args.json_logs, args.verbose || config.debug);

    info!("Starting syslog-amqp");
    info!(
        broker = %config.broker.redacted_uri(),
        exchange = %config.broker.exchange,
        format = %config.syslog.format,
        routing_key = %config.routing.key,
        retry_count = config.retry.retry_count,
        "Configuration summary"
    );

    let mut adapter = SyslogAmqpAdapter::connect(&config)
        .await
        .context("failed to start adapter")?;

    let (tx, mut rx) = mpsc::channel(config.channel_capacity);
    let reader = tokio::spawn(read_records(tx));

    let outcome = adapter.stream(&mut rx).await;
    // Unblocks the reader if it is waiting on a full channel.
    rx.close();
    reader.abort();

    match outcome {
        Ok(stats) => {
            info!(published = stats.published, omitted = stats.omitted, "Input finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Adapter stopped");
            Err(e).context("log stream terminated")
        }
    }
}

async fn read_records(tx: mpsc::Sender<LogRecord>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LogRecord>(&line) {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed record"),
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("syslog_amqp=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("syslog_amqp=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
