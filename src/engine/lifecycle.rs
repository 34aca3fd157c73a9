use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::ScanEngine;
use super::runtime::{EngineEndpoint, EngineRuntime};
use crate::errors::{poll_until, DastError, PollOutcome, PollPolicy, PollStep};

/// Starts the engine and hands back a guard that owns its teardown.
pub struct EngineManager {
    runtime: Arc<dyn EngineRuntime>,
}

impl EngineManager {
    pub fn new(runtime: Arc<dyn EngineRuntime>) -> Self {
        Self { runtime }
    }

    /// Start the engine. The returned guard is armed before anything else
    /// can fail, so every later exit path releases the engine.
    pub async fn start(&self, output_dir: &Path) -> Result<(EngineGuard, EngineEndpoint), DastError> {
        info!(runtime = self.runtime.name(), "Starting scan engine");
        let endpoint = self.runtime.start().await?;
        let guard = EngineGuard {
            runtime: Some(self.runtime.clone()),
            workspace: endpoint.workspace.clone(),
            preserve: output_dir.to_path_buf(),
        };
        Ok((guard, endpoint))
    }
}

/// Ask the engine for its version until it answers. Any failed request
/// counts as "not yet"; running out of attempts is fatal.
pub async fn wait_until_ready(
    engine: &dyn ScanEngine,
    interval: Duration,
    attempts: u32,
    cancel: &CancellationToken,
) -> Result<String, DastError> {
    let mut policy = PollPolicy::with_attempts(interval, attempts);
    policy.max_transient_errors = attempts;

    let outcome = poll_until("engine readiness", &policy, cancel, || async move {
        match engine.version().await {
            Ok(version) => Ok(PollStep::Done(version)),
            Err(e) => {
                debug!(error = %e, "Engine not ready yet");
                Ok(PollStep::Pending(None))
            }
        }
    })
    .await?;

    match outcome {
        PollOutcome::Ready { value, polls } => {
            info!(version = %value, polls, "Scan engine is ready");
            Ok(value)
        }
        PollOutcome::GaveUp { polls, .. } => Err(DastError::EngineUnreachable(format!(
            "no answer after {} attempts at {:?} intervals",
            polls, interval
        ))),
    }
}

/// Owns the running engine. [`EngineGuard::release`] stops it and removes the
/// ephemeral workspace exactly once; dropping an unreleased guard schedules
/// the same work on the current runtime.
pub struct EngineGuard {
    runtime: Option<Arc<dyn EngineRuntime>>,
    workspace: Option<PathBuf>,
    preserve: PathBuf,
}

impl EngineGuard {
    pub async fn release(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        teardown(runtime, self.workspace.take(), &self.preserve).await;
    }
}

async fn teardown(runtime: Arc<dyn EngineRuntime>, workspace: Option<PathBuf>, preserve: &Path) {
    match runtime.stop().await {
        Ok(()) => info!(runtime = runtime.name(), "Scan engine stopped"),
        Err(e) => warn!(runtime = runtime.name(), error = %e, "Failed to stop scan engine"),
    }
    if let Some(workspace) = workspace {
        if let Err(e) = cleanup_workspace(&workspace, preserve) {
            warn!(workspace = %workspace.display(), error = %e, "Failed to remove engine workspace");
        }
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let workspace = self.workspace.take();
        let preserve = self.preserve.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Engine guard dropped without release; scheduling teardown");
                handle.spawn(async move { teardown(runtime, workspace, &preserve).await });
            }
            Err(_) => warn!(runtime = runtime.name(), "No async runtime left to stop the scan engine"),
        }
    }
}

/// Remove the engine workspace. When the output directory lies inside it,
/// only the entries that do not contain the output are removed.
pub fn cleanup_workspace(workspace: &Path, output_dir: &Path) -> std::io::Result<()> {
    if !workspace.exists() {
        return Ok(());
    }
    let workspace = workspace.canonicalize()?;
    let output = absolute(output_dir);

    if !output.starts_with(&workspace) {
        std::fs::remove_dir_all(&workspace)?;
        debug!(workspace = %workspace.display(), "Removed engine workspace");
        return Ok(());
    }
    if output == workspace {
        debug!(workspace = %workspace.display(), "Workspace is the output directory; keeping it");
        return Ok(());
    }

    for entry in std::fs::read_dir(&workspace)? {
        let path = entry?.path();
        if output.starts_with(&path) {
            if path.is_dir() && path != output {
                cleanup_workspace(&path, &output)?;
            }
            continue;
        }
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}
