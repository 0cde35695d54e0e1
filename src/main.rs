//! `gate-bridge [config.toml]`
//!
//! Runs the bridge against the configured gate. Queue message bodies are read
//! from stdin, one per line, into an in-process queue.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use gate_bridge::config::BridgeConfig;
use gate_bridge::service::sink::{CommandSink, LogSink, WebhookSink};
use gate_bridge::service::Bridge;
use gate_bridge::transport::LocalQueue;
use gate_bridge::utils::logging::init_logging;
use gate_bridge::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

fn load_config() -> Result<BridgeConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

/// Push every non-empty stdin line onto the queue until stdin closes.
async fn feed_from_stdin(queue: Arc<LocalQueue>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let receipt = queue.push(line)?;
        info!(receipt = %receipt, "Message queued from stdin");
    }
    info!("Stdin closed, no further messages will be queued");
    Ok(())
}

async fn run(config: BridgeConfig) -> Result<()> {
    let queue = Arc::new(
        LocalQueue::new(config.queue.batch_size, Duration::from_secs(20))
            .with_visibility_timeout(config.queue.visibility_timeout),
    );

    let sink: Arc<dyn CommandSink> = match WebhookSink::from_config(&config.webhook)? {
        Some(webhook) => {
            info!("Relaying gate chat to webhook");
            Arc::new(webhook)
        }
        None => Arc::new(LogSink),
    };

    let feeder = tokio::spawn(feed_from_stdin(queue.clone()));
    let bridge = Bridge::new(config, queue, sink);

    let result = tokio::select! {
        r = bridge.run() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    feeder.abort();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = config.validate_strict() {
        error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }
    if config.credentials.username.is_none() {
        warn!("No gate username configured; login will fail");
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Bridge exited");
            ExitCode::FAILURE
        }
    }
}
