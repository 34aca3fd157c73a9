use std::time::Duration;

use crate::models::{PolicyVerdict, Severity};
use crate::session::SessionState;
use super::phase::{PhaseKind, PhaseStatus};

/// Messages sent from the pipeline to the CLI for real-time display.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ScanStarted {
        scan_id: String,
        target: String,
    },
    /// The session entered a new state
    StageChanged {
        state: SessionState,
    },
    PhaseStarted {
        phase: PhaseKind,
        display_name: String,
        deadline: Duration,
    },
    /// Latest status answer for a running phase
    PhaseProgress {
        phase: PhaseKind,
        percent: u8,
    },
    PhaseFinished {
        phase: PhaseKind,
        status: PhaseStatus,
        polls: u32,
        skipped: bool,
    },
    FindingsNormalized {
        total: usize,
        highest: Option<Severity>,
    },
    VerdictReady {
        verdict: PolicyVerdict,
    },
    ScanCompleted {
        exit_code: i32,
    },
    ScanAborted {
        reason: String,
    },
}
