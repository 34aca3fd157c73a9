use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::ScanConfig;
use crate::engine::lifecycle::wait_until_ready;
use crate::engine::{EngineEndpoint, EngineManager, EngineRuntime, ScanEngine};
use crate::errors::DastError;
use crate::reporting::ResultSink;
use super::events::PipelineEvent;
use super::orchestrator::{ScanOrchestrator, ScanOutcome};

/// Everything a scan run needs besides its configuration.
pub struct ScanRun<F> {
    pub runtime: Arc<dyn EngineRuntime>,
    /// Builds the engine client once the runtime reports its endpoint.
    pub connect: F,
    pub sinks: Vec<Arc<dyn ResultSink>>,
    pub event_tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    pub cancel_token: CancellationToken,
}

/// Start the engine, run the session and release the engine on every exit
/// path, including a panic inside the pipeline task and cancellation.
pub async fn run_scan<F>(config: Arc<ScanConfig>, run: ScanRun<F>) -> Result<ScanOutcome, DastError>
where
    F: FnOnce(&EngineEndpoint) -> Result<Arc<dyn ScanEngine>, DastError>,
{
    // Missing credentials never start an engine.
    config.auth.validate(config.target.as_str())?;

    let ScanRun { runtime, connect, sinks, event_tx, cancel_token } = run;
    let manager = EngineManager::new(runtime);
    let (mut guard, endpoint) = manager.start(&config.output_dir).await?;

    let result = drive(config, &endpoint, connect, sinks, event_tx, cancel_token).await;
    guard.release().await;
    result
}

async fn drive<F>(
    config: Arc<ScanConfig>,
    endpoint: &EngineEndpoint,
    connect: F,
    sinks: Vec<Arc<dyn ResultSink>>,
    event_tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    cancel_token: CancellationToken,
) -> Result<ScanOutcome, DastError>
where
    F: FnOnce(&EngineEndpoint) -> Result<Arc<dyn ScanEngine>, DastError>,
{
    let engine = connect(endpoint)?;
    let version = wait_until_ready(
        engine.as_ref(),
        config.engine.readiness_interval,
        config.engine.readiness_attempts,
        &cancel_token,
    )
    .await?;

    let mut orchestrator = ScanOrchestrator::new(config, engine)
        .with_cancel_token(cancel_token)
        .with_engine_version(Some(version));
    for sink in sinks {
        orchestrator = orchestrator.with_sink(sink);
    }
    if let Some(tx) = event_tx {
        orchestrator = orchestrator.with_event_channel(tx);
    }

    match tokio::spawn(async move { orchestrator.run().await }).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(error = %join_err, "Scan pipeline task failed");
            Err(DastError::Internal(format!("Scan pipeline task failed: {}", join_err)))
        }
    }
}
