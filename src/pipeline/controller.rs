use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::ScanEngine;
use crate::errors::{poll_until, DastError, GiveUpReason, PollOutcome, PollPolicy, PollStep};
use super::events::PipelineEvent;
use super::phase::{PhaseRequest, PhaseStatus, ScanPhase};

/// Runs one phase: submit the job, poll it to completion or deadline,
/// and stop it on the engine when it runs out of time.
pub struct PhaseController {
    engine: Arc<dyn ScanEngine>,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    max_poll_errors: u32,
}

impl PhaseController {
    pub fn new(engine: Arc<dyn ScanEngine>, cancel_token: CancellationToken) -> Self {
        Self { engine, cancel_token, event_tx: None, max_poll_errors: 3 }
    }

    pub fn with_event_channel(mut self, tx: Option<mpsc::UnboundedSender<PipelineEvent>>) -> Self {
        self.event_tx = tx;
        self
    }

    pub fn with_max_poll_errors(mut self, max_poll_errors: u32) -> Self {
        self.max_poll_errors = max_poll_errors;
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Drive `phase` to a finished status. Running out of time or transport
    /// retries leaves it `TimedOut` and returns `Ok`; a rejected submission
    /// or an engine-reported error while polling is returned as an error.
    pub async fn run_phase(&self, phase: &mut ScanPhase, request: &PhaseRequest) -> Result<(), DastError> {
        let kind = phase.kind;
        phase.started_at = Some(Utc::now());

        let job = match self.engine.start_phase(kind, request).await {
            Ok(job) => job,
            Err(e) => {
                phase.finish(PhaseStatus::Failed);
                return Err(match e {
                    DastError::Cancelled(_) => e,
                    other => DastError::Engine(format!("{} submission returned no job id: {}", kind, other)),
                });
            }
        };
        phase.job_id = Some(job.clone());
        phase.status = PhaseStatus::Running;
        info!(phase = %kind, job_id = %job, deadline = ?phase.deadline, "Phase started");
        self.emit(PipelineEvent::PhaseStarted {
            phase: kind,
            display_name: kind.definition().display_name.to_string(),
            deadline: phase.deadline,
        });

        let policy = PollPolicy {
            interval: phase.poll_interval,
            deadline: Some(phase.deadline),
            max_attempts: None,
            max_transient_errors: self.max_poll_errors,
        };
        let label = format!("{} status", kind);
        let engine = &self.engine;
        let events = &self.event_tx;
        let job_ref = &job;

        let outcome = poll_until(&label, &policy, &self.cancel_token, || {
            let engine = engine.clone();
            let events = events.clone();
            let job = job_ref.clone();
            async move {
                let progress = engine.phase_progress(kind, &job).await?;
                debug!(phase = %kind, percent = progress.percent(), "Phase status");
                if let Some(tx) = events {
                    let _ = tx.send(PipelineEvent::PhaseProgress { phase: kind, percent: progress.percent() });
                }
                Ok(if progress.is_complete() {
                    PollStep::Done(progress)
                } else {
                    PollStep::Pending(Some(progress))
                })
            }
        })
        .await;

        let result = match outcome {
            Ok(PollOutcome::Ready { polls, .. }) => {
                phase.polls = polls;
                phase.progress_percent = 100;
                phase.finish(PhaseStatus::Completed);
                info!(phase = %kind, polls, "Phase completed");
                Ok(())
            }
            Ok(PollOutcome::GaveUp { last, polls, reason }) => {
                phase.polls = polls;
                phase.progress_percent = last.map(|p| p.percent()).unwrap_or(0);
                match reason {
                    GiveUpReason::TransientErrors => warn!(
                        phase = %kind,
                        polls,
                        "Phase status unavailable after repeated errors; treating as timed out"
                    ),
                    _ => warn!(
                        phase = %kind,
                        polls,
                        progress = phase.progress_percent,
                        "Phase deadline reached; continuing with partial results"
                    ),
                }
                // Stopping is best effort and may not stretch the phase by more than one interval.
                match tokio::time::timeout(phase.poll_interval, self.engine.stop_phase(kind, &job)).await {
                    Ok(Ok(())) => debug!(phase = %kind, "Timed-out phase stopped on the engine"),
                    Ok(Err(e)) => warn!(phase = %kind, error = %e, "Failed to stop timed-out phase"),
                    Err(_) => warn!(phase = %kind, "Engine did not answer the stop request in time"),
                }
                phase.finish(PhaseStatus::TimedOut);
                Ok(())
            }
            Err(e) => {
                phase.finish(PhaseStatus::Failed);
                Err(e)
            }
        };

        self.emit(PipelineEvent::PhaseFinished {
            phase: kind,
            status: phase.status,
            polls: phase.polls,
            skipped: false,
        });
        result
    }
}
