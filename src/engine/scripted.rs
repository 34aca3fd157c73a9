use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use super::api::{ContextId, ScanEngine};
use crate::errors::DastError;
use crate::models::report::{RawAlert, RawInstance, RawReport, RawSite};
use crate::pipeline::phase::{JobId, PhaseKind, PhaseProgress, PhaseRequest};

/// Engine operations, as recorded by [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Version,
    FindContext(String),
    CreateContext(String),
    IncludeInContext { context: String, regex: String },
    SetFormAuthentication { login_url: String, login_request_data: String },
    CreateUser { name: String, username: String },
    SetForcedUser(String),
    AddRequestHeader { header: String, value: String, url_regex: String },
    StartPhase(PhaseKind),
    PhaseProgress(PhaseKind),
    StopPhase(PhaseKind),
    Report,
}

/// Status answer for one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedStatus {
    Progress(PhaseProgress),
    /// Simulated transport failure (retryable).
    TransportError,
    /// Engine-reported failure (fatal).
    EngineError,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailingOp {
    Version,
    CreateContext,
    IncludeInContext,
    FormAuthentication,
    AddRequestHeader,
    StartPhase(PhaseKind),
    StopPhase(PhaseKind),
    Report,
}

#[derive(Debug, Default)]
struct ScriptState {
    contexts: HashMap<String, ContextId>,
    next_context: u32,
    next_job: u32,
    statuses: HashMap<PhaseKind, VecDeque<ScriptedStatus>>,
    failures: HashMap<FailingOp, ScriptedStatus>,
    report: RawReport,
    /// Delay before every status and stop answer.
    latency: Option<Duration>,
    calls: Vec<EngineCall>,
}

/// In-process engine driven by a script. Backs `--dry-run` and the test
/// suites; every call is recorded for inspection.
///
/// Each phase answers statuses from its queue; the last entry repeats.
/// Phases with no script complete on the first poll.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    state: Mutex<ScriptState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine used by `--dry-run`: every phase finishes after a few polls
    /// and the report holds a small, fixed set of alerts.
    pub fn demo() -> Self {
        let ramp = |steps: &[u8]| -> Vec<ScriptedStatus> {
            steps.iter().map(|p| ScriptedStatus::Progress(PhaseProgress::Percent(*p))).collect()
        };
        Self::new()
            .with_statuses(PhaseKind::Spider, ramp(&[35, 80, 100]))
            .with_statuses(
                PhaseKind::AjaxSpider,
                vec![
                    ScriptedStatus::Progress(PhaseProgress::Running(true)),
                    ScriptedStatus::Progress(PhaseProgress::Running(false)),
                ],
            )
            .with_statuses(PhaseKind::ActiveScan, ramp(&[20, 55, 90, 100]))
            .with_report(demo_report())
    }

    pub fn with_existing_context(self, name: &str, id: &str) -> Self {
        self.lock().contexts.insert(name.to_string(), ContextId(id.to_string()));
        self
    }

    pub fn with_statuses(self, kind: PhaseKind, statuses: Vec<ScriptedStatus>) -> Self {
        self.lock().statuses.insert(kind, statuses.into());
        self
    }

    /// Every poll of `kind` reports the same progress forever.
    pub fn stuck_at(self, kind: PhaseKind, percent: u8) -> Self {
        self.with_statuses(kind, vec![ScriptedStatus::Progress(PhaseProgress::Percent(percent))])
    }

    pub fn failing(self, op: FailingOp, failure: ScriptedStatus) -> Self {
        self.lock().failures.insert(op, failure);
        self
    }

    /// Status and stop requests take `latency` to answer, as on an
    /// overloaded engine.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    pub fn with_report(self, report: RawReport) -> Self {
        self.lock().report = report;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // A panicking test thread must not hide the recorded calls.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn answer_delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn record(&self, call: EngineCall, op: Option<FailingOp>) -> Result<(), DastError> {
        let mut state = self.lock();
        state.calls.push(call);
        match op.and_then(|op| state.failures.get(&op).cloned()) {
            Some(failure) => Err(failure_error(&failure)),
            None => Ok(()),
        }
    }
}

fn demo_report() -> RawReport {
    let alert = |plugin: &str, name: &str, risk: &str, cwe: &str, wasc: &str, uri: &str, param: &str| RawAlert {
        pluginid: Some(plugin.to_string()),
        alert: Some(name.to_string()),
        risk: Some(risk.to_string()),
        confidence: Some("Medium".to_string()),
        cweid: Some(cwe.to_string()),
        wascid: Some(wasc.to_string()),
        instances: vec![RawInstance {
            uri: uri.to_string(),
            method: "GET".to_string(),
            param: param.to_string(),
            evidence: String::new(),
            ..Default::default()
        }],
        ..Default::default()
    };
    RawReport {
        version: Some("simulated".to_string()),
        generated: None,
        site: vec![RawSite {
            name: Some("http://simulated.local".to_string()),
            alerts: vec![
                alert("10038", "Content Security Policy (CSP) Header Not Set", "Medium", "693", "15", "http://simulated.local/", ""),
                alert("10010", "Cookie No HttpOnly Flag", "Low", "1004", "13", "http://simulated.local/login", "session"),
                alert("10036", "Server Leaks Version Information", "Low", "200", "13", "http://simulated.local/", ""),
                alert("10027", "Information Disclosure - Suspicious Comments", "Informational", "200", "13", "http://simulated.local/app.js", ""),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn failure_error(status: &ScriptedStatus) -> DastError {
    match status {
        ScriptedStatus::TransportError => DastError::Network("scripted connection reset".into()),
        _ => DastError::Engine("scripted engine failure".into()),
    }
}

#[async_trait]
impl ScanEngine for ScriptedEngine {
    async fn version(&self) -> Result<String, DastError> {
        self.record(EngineCall::Version, Some(FailingOp::Version))?;
        Ok("scripted".to_string())
    }

    async fn find_context(&self, name: &str) -> Result<Option<ContextId>, DastError> {
        self.record(EngineCall::FindContext(name.to_string()), None)?;
        Ok(self.lock().contexts.get(name).cloned())
    }

    async fn create_context(&self, name: &str) -> Result<ContextId, DastError> {
        self.record(EngineCall::CreateContext(name.to_string()), Some(FailingOp::CreateContext))?;
        let mut state = self.lock();
        state.next_context += 1;
        let id = ContextId(state.next_context.to_string());
        state.contexts.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn include_in_context(&self, context_name: &str, regex: &str) -> Result<(), DastError> {
        self.record(
            EngineCall::IncludeInContext { context: context_name.to_string(), regex: regex.to_string() },
            Some(FailingOp::IncludeInContext),
        )
    }

    async fn set_form_authentication(
        &self,
        _context: &ContextId,
        login_url: &str,
        login_request_data: &str,
    ) -> Result<(), DastError> {
        self.record(
            EngineCall::SetFormAuthentication {
                login_url: login_url.to_string(),
                login_request_data: login_request_data.to_string(),
            },
            Some(FailingOp::FormAuthentication),
        )
    }

    async fn create_user(
        &self,
        _context: &ContextId,
        name: &str,
        username: &str,
        _password: &str,
    ) -> Result<String, DastError> {
        self.record(
            EngineCall::CreateUser { name: name.to_string(), username: username.to_string() },
            None,
        )?;
        Ok("0".to_string())
    }

    async fn set_forced_user(&self, _context: &ContextId, user_id: &str) -> Result<(), DastError> {
        self.record(EngineCall::SetForcedUser(user_id.to_string()), None)
    }

    async fn add_request_header(
        &self,
        _description: &str,
        header: &str,
        value: &str,
        url_regex: &str,
    ) -> Result<(), DastError> {
        self.record(
            EngineCall::AddRequestHeader {
                header: header.to_string(),
                value: value.to_string(),
                url_regex: url_regex.to_string(),
            },
            Some(FailingOp::AddRequestHeader),
        )
    }

    async fn start_phase(&self, kind: PhaseKind, _request: &PhaseRequest) -> Result<JobId, DastError> {
        self.record(EngineCall::StartPhase(kind), Some(FailingOp::StartPhase(kind)))?;
        let mut state = self.lock();
        let id = state.next_job;
        state.next_job += 1;
        Ok(JobId(id.to_string()))
    }

    async fn phase_progress(&self, kind: PhaseKind, _job: &JobId) -> Result<PhaseProgress, DastError> {
        self.record(EngineCall::PhaseProgress(kind), None)?;
        self.answer_delay().await;
        let mut state = self.lock();
        let status = match state.statuses.get_mut(&kind) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match status {
            None => Ok(match kind {
                PhaseKind::AjaxSpider => PhaseProgress::Running(false),
                _ => PhaseProgress::Percent(100),
            }),
            Some(ScriptedStatus::Progress(progress)) => Ok(progress),
            Some(failure) => Err(failure_error(&failure)),
        }
    }

    async fn stop_phase(&self, kind: PhaseKind, _job: &JobId) -> Result<(), DastError> {
        self.record(EngineCall::StopPhase(kind), Some(FailingOp::StopPhase(kind)))?;
        self.answer_delay().await;
        Ok(())
    }

    async fn report(&self) -> Result<RawReport, DastError> {
        self.record(EngineCall::Report, Some(FailingOp::Report))?;
        Ok(self.lock().report.clone())
    }
}
