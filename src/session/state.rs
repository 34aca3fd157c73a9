use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::auth::AuthMethod;
use crate::engine::ContextId;
use crate::errors::DastError;
use crate::pipeline::phase::PhaseKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Created,
    ContextConfigured,
    AuthConfigured,
    Spidering,
    AjaxSpidering,
    ActiveScanning,
    ReportGenerated,
    PolicyEvaluated,
    Done,
    Aborted,
}

impl SessionState {
    /// The only state reachable by a forward transition.
    pub fn successor(&self) -> Option<SessionState> {
        match self {
            Self::Created => Some(Self::ContextConfigured),
            Self::ContextConfigured => Some(Self::AuthConfigured),
            Self::AuthConfigured => Some(Self::Spidering),
            Self::Spidering => Some(Self::AjaxSpidering),
            Self::AjaxSpidering => Some(Self::ActiveScanning),
            Self::ActiveScanning => Some(Self::ReportGenerated),
            Self::ReportGenerated => Some(Self::PolicyEvaluated),
            Self::PolicyEvaluated => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    pub fn for_phase(kind: PhaseKind) -> SessionState {
        match kind {
            PhaseKind::Spider => Self::Spidering,
            PhaseKind::AjaxSpider => Self::AjaxSpidering,
            PhaseKind::ActiveScan => Self::ActiveScanning,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::ContextConfigured => "context-configured",
            Self::AuthConfigured => "auth-configured",
            Self::Spidering => "spidering",
            Self::AjaxSpidering => "ajax-spidering",
            Self::ActiveScanning => "active-scanning",
            Self::ReportGenerated => "report-generated",
            Self::PolicyEvaluated => "policy-evaluated",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// In-memory record of the one scan session this process owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: String,
    pub target_url: String,
    pub context_id: Option<ContextId>,
    pub auth_method: AuthMethod,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub abort_reason: Option<String>,
    /// Every state entered, in order, starting with `Created`.
    pub history: Vec<SessionState>,
}

impl ScanSession {
    pub fn new(id: &str, target_url: &str, auth_method: AuthMethod) -> Self {
        Self {
            id: id.to_string(),
            target_url: target_url.to_string(),
            context_id: None,
            auth_method,
            state: SessionState::Created,
            created_at: Utc::now(),
            abort_reason: None,
            history: vec![SessionState::Created],
        }
    }

    /// Move to `next`, which must be the current state's successor.
    pub fn advance(&mut self, next: SessionState) -> Result<(), DastError> {
        if self.state.successor() != Some(next) {
            return Err(DastError::Internal(format!(
                "Illegal session transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Enter `Aborted` from any non-terminal state. No-op once terminal.
    pub fn abort(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Aborted;
        self.abort_reason = Some(reason.to_string());
        self.history.push(SessionState::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ScanSession {
        ScanSession::new("s1", "https://app.example.com", AuthMethod::None)
    }

    #[test]
    fn test_full_forward_walk_reaches_done() {
        let mut s = session();
        while let Some(next) = s.state.successor() {
            s.advance(next).unwrap();
        }
        assert_eq!(s.state, SessionState::Done);
        assert_eq!(s.history.len(), 9);
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut s = session();
        assert!(s.advance(SessionState::AuthConfigured).is_err());
        assert_eq!(s.state, SessionState::Created);
    }

    #[test]
    fn test_abort_from_mid_pipeline() {
        let mut s = session();
        s.advance(SessionState::ContextConfigured).unwrap();
        s.abort("engine rejected context");
        assert_eq!(s.state, SessionState::Aborted);
        assert_eq!(s.abort_reason.as_deref(), Some("engine rejected context"));
        assert!(s.advance(SessionState::AuthConfigured).is_err());
    }

    #[test]
    fn test_abort_after_done_is_ignored() {
        let mut s = session();
        while let Some(next) = s.state.successor() {
            s.advance(next).unwrap();
        }
        s.abort("late");
        assert_eq!(s.state, SessionState::Done);
        assert!(s.abort_reason.is_none());
    }

    #[test]
    fn test_phase_states() {
        assert_eq!(SessionState::for_phase(PhaseKind::AjaxSpider), SessionState::AjaxSpidering);
        assert_eq!(SessionState::Spidering.successor(), Some(SessionState::AjaxSpidering));
    }
}
