use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ScanConfig;
use crate::engine::ScanEngine;
use crate::errors::{with_retry, DastError, RetryConfig};
use crate::models::{count_by_severity, FindingsDocument, FindingsSummary, PhaseRecord, ScanMetadata};
use crate::policy::evaluate;
use crate::reporting::{normalize, ResultSink};
use crate::session::{ScanSession, SessionConfigurator, SessionState};
use super::controller::PhaseController;
use super::events::PipelineEvent;
use super::phase::{PhaseKind, PhaseRequest, ScanPhase};

/// Result of a session that reached `Done`.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub document: FindingsDocument,
    pub session: ScanSession,
}

impl ScanOutcome {
    pub fn exit_code(&self) -> i32 {
        self.document.verdict.exit_code()
    }
}

/// Drives one scan session from context setup to result handoff against an
/// engine that is already reachable.
pub struct ScanOrchestrator {
    config: Arc<ScanConfig>,
    engine: Arc<dyn ScanEngine>,
    session: Arc<RwLock<ScanSession>>,
    phases: Arc<RwLock<Vec<ScanPhase>>>,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    sinks: Vec<Arc<dyn ResultSink>>,
    engine_version: Option<String>,
}

impl ScanOrchestrator {
    pub fn new(config: Arc<ScanConfig>, engine: Arc<dyn ScanEngine>) -> Self {
        let session = ScanSession::new(&config.scan_id, config.target.as_str(), config.auth.method());
        Self {
            config,
            engine,
            session: Arc::new(RwLock::new(session)),
            phases: Arc::new(RwLock::new(Vec::new())),
            cancel_token: CancellationToken::new(),
            event_tx: None,
            sinks: Vec::new(),
            engine_version: None,
        }
    }

    /// Replace the orchestrator's cancel token with an external one so that
    /// cancelling it interrupts the poll loops.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_engine_version(mut self, version: Option<String>) -> Self {
        self.engine_version = version;
        self
    }

    /// Shared handle on the session record, readable while the scan runs.
    pub fn session(&self) -> Arc<RwLock<ScanSession>> {
        self.session.clone()
    }

    pub async fn phases(&self) -> Vec<ScanPhase> {
        self.phases.read().await.clone()
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    async fn advance(&self, next: SessionState) -> Result<(), DastError> {
        self.session.write().await.advance(next)?;
        info!(state = %next, "Session state changed");
        self.emit(PipelineEvent::StageChanged { state: next });
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), DastError> {
        if self.cancel_token.is_cancelled() {
            return Err(DastError::Cancelled("Scan interrupted".into()));
        }
        Ok(())
    }

    /// Run the session. Any error moves the session to `Aborted` before it
    /// is returned; phase timeouts are not errors.
    pub async fn run(&self) -> Result<ScanOutcome, DastError> {
        match self.execute().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let classification = e.classify();
                error!(error = %e, error_type = classification.error_type, "Scan session aborted");
                self.session.write().await.abort(&e.to_string());
                self.emit(PipelineEvent::ScanAborted { reason: e.to_string() });
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<ScanOutcome, DastError> {
        let started_at = Utc::now();
        let config = &self.config;
        info!(scan_id = %config.scan_id, target = %config.target, auth = %config.auth.method(), "Scan started");
        self.emit(PipelineEvent::ScanStarted {
            scan_id: config.scan_id.clone(),
            target: config.target.to_string(),
        });

        // Credentials are checked before the engine sees anything.
        config.auth.validate(config.target.as_str())?;

        let configurator = SessionConfigurator::new(self.engine.clone());

        self.check_cancelled()?;
        let context_id = configurator.create_or_reuse_context(&config.context_name, &config.target).await?;
        self.session.write().await.context_id = Some(context_id.clone());
        self.advance(SessionState::ContextConfigured).await?;

        self.check_cancelled()?;
        configurator.configure_auth(&context_id, &config.auth, &config.target).await?;
        self.advance(SessionState::AuthConfigured).await?;

        let controller = PhaseController::new(self.engine.clone(), self.cancel_token.clone())
            .with_event_channel(self.event_tx.clone())
            .with_max_poll_errors(config.phases.max_poll_errors);
        let request = PhaseRequest {
            target_url: config.target.to_string(),
            context_name: config.context_name.clone(),
            context_id: context_id.0.clone(),
            depth: config.phases.depth,
            threads: config.phases.threads,
            browser_id: Some(config.phases.browser_id.clone()),
        };

        for kind in PhaseKind::ORDER {
            self.check_cancelled()?;
            self.advance(SessionState::for_phase(kind)).await?;

            if !config.phases.enabled(kind) {
                info!(phase = %kind, "Phase disabled; skipping");
                let phase = ScanPhase::skipped(kind);
                self.emit(PipelineEvent::PhaseFinished {
                    phase: kind,
                    status: phase.status,
                    polls: 0,
                    skipped: true,
                });
                self.phases.write().await.push(phase);
                continue;
            }

            let mut phase = ScanPhase::new(
                kind,
                config.phases.poll_interval(kind),
                config.phases.deadline(kind),
            );
            let result = controller.run_phase(&mut phase, &request).await;
            self.phases.write().await.push(phase);
            result?;
        }

        self.check_cancelled()?;
        let engine = &self.engine;
        let raw = with_retry("report retrieval", &RetryConfig::default(), || engine.report()).await?;
        self.advance(SessionState::ReportGenerated).await?;

        let findings = normalize(&raw);
        let counts = count_by_severity(&findings);
        let summary = FindingsSummary::from_findings(&findings);
        info!(
            total = summary.total,
            by_severity = ?summary.by_severity,
            top_categories = ?summary.top_categories.iter().map(|c| c.category.as_str()).collect::<Vec<_>>(),
            "Findings normalized"
        );
        self.emit(PipelineEvent::FindingsNormalized {
            total: findings.len(),
            highest: findings.iter().map(|f| f.severity).min(),
        });

        let verdict = evaluate(&counts, &config.policy);
        if verdict.passed {
            info!("Security policy passed");
        } else {
            for v in &verdict.violations {
                warn!(severity = %v.severity, count = v.count, threshold = v.threshold, rule = ?v.rule, "Policy violation");
            }
        }
        self.emit(PipelineEvent::VerdictReady { verdict: verdict.clone() });
        self.advance(SessionState::PolicyEvaluated).await?;

        let phases = self.phases.read().await.iter().map(PhaseRecord::from).collect();
        let document = FindingsDocument {
            findings,
            verdict,
            scan_metadata: ScanMetadata {
                scan_id: config.scan_id.clone(),
                target: config.target.to_string(),
                auth_method: config.auth.method(),
                started_at,
                finished_at: Utc::now(),
                phases,
                engine_version: self.engine_version.clone(),
                scanner_version: crate::scanner_version().to_string(),
            },
            summary,
        };

        let exit_code = document.verdict.exit_code();
        let mut handoff_error = None;
        for sink in &self.sinks {
            match sink.publish(&document, &raw).await {
                Ok(()) => info!(sink = sink.name(), "Findings handed off"),
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "Findings handoff failed");
                    handoff_error.get_or_insert(e);
                }
            }
        }
        // A failed verdict keeps its exit code; a passing one cannot hide lost results.
        if let Some(e) = handoff_error {
            if document.verdict.passed {
                return Err(e);
            }
            warn!(exit_code, "Keeping the policy exit code despite the handoff failure");
        }

        self.advance(SessionState::Done).await?;
        self.emit(PipelineEvent::ScanCompleted { exit_code });
        info!(exit_code, "Scan finished");

        Ok(ScanOutcome {
            document,
            session: self.session.read().await.clone(),
        })
    }
}
