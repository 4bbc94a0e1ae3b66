//! Speed-Limit Sign Watch
//!
//! Composition root: wires the perception gateway, the detector state
//! machine and the speed-limit lifecycle onto a single serialized input
//! queue, and hosts the logging and metrics bootstrap.

pub mod config;
pub mod engine;
pub mod source;

pub use config::{EngineConfig, LoggingConfig, MetricsConfig, SourceConfig, WatchConfig};
pub use engine::{Engine, Input, PresentationEvent};
pub use source::FrameSource;

use metrics_exporter_prometheus::PrometheusBuilder;
use perception::{Capabilities, PerceptionError, TokioGateway};
use thiserror::Error;
use timer::TokioScheduler;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Sign watch error types
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.expect("Failed to set tracing subscriber");
}

/// Install the Prometheus exporter if a listen address is configured
pub fn init_metrics(config: &MetricsConfig) -> Result<(), WatchError> {
    let Some(addr) = config.listen else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WatchError::Metrics(e.to_string()))?;

    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

/// Run the watch over a synthetic camera with the given capabilities.
///
/// Presentation events go to `outbox`. Returns once the frame source has
/// finished and the engine has drained its queue.
pub async fn run(
    config: WatchConfig,
    capabilities: Capabilities,
    outbox: mpsc::Sender<PresentationEvent>,
) -> Result<(), WatchError> {
    config.validate()?;

    let (inbox_tx, inbox_rx) = mpsc::channel::<Input>(config.engine.inbox_capacity);

    let gateway = TokioGateway::new(capabilities, config.preprocess.clone(), inbox_tx.clone())?;
    let scheduler = TokioScheduler::new(inbox_tx.clone());
    let engine = Engine::new(
        config.detector.clone(),
        config.lifecycle.clone(),
        gateway,
        scheduler,
    );

    let interrupt = inbox_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            let _ = interrupt.send(Input::Shutdown).await;
        }
    });

    let engine_task = tokio::spawn(engine.run(inbox_rx, outbox));
    let source = FrameSource::new(config.source.clone()).run(inbox_tx).await;
    engine_task.await?;

    info!("Sign watch stopped, {} frames dropped", source.dropped());
    Ok(())
}
