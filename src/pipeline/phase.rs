use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseKind {
    Spider,
    AjaxSpider,
    ActiveScan,
}

impl PhaseKind {
    /// Fixed execution order.
    pub const ORDER: [PhaseKind; 3] = [PhaseKind::Spider, PhaseKind::AjaxSpider, PhaseKind::ActiveScan];

    pub fn definition(&self) -> &'static PhaseDefinition {
        match self {
            PhaseKind::Spider => &PHASES[0],
            PhaseKind::AjaxSpider => &PHASES[1],
            PhaseKind::ActiveScan => &PHASES[2],
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spider => write!(f, "spider"),
            Self::AjaxSpider => write!(f, "ajax-spider"),
            Self::ActiveScan => write!(f, "active-scan"),
        }
    }
}

/// How a phase reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Percent,
    RunningFlag,
}

pub struct PhaseDefinition {
    pub kind: PhaseKind,
    pub display_name: &'static str,
    pub description: &'static str,
    pub default_poll_interval: Duration,
    pub progress: ProgressKind,
}

pub static PHASES: [PhaseDefinition; 3] = [
    PhaseDefinition {
        kind: PhaseKind::Spider,
        display_name: "Spider",
        description: "Link and form crawl to discover reachable endpoints",
        default_poll_interval: Duration::from_secs(10),
        progress: ProgressKind::Percent,
    },
    PhaseDefinition {
        kind: PhaseKind::AjaxSpider,
        display_name: "AJAX Spider",
        description: "Browser-driven crawl for JavaScript-rendered content",
        default_poll_interval: Duration::from_secs(10),
        progress: ProgressKind::RunningFlag,
    },
    PhaseDefinition {
        kind: PhaseKind::ActiveScan,
        display_name: "Active Scan",
        description: "Attack payloads against discovered endpoints",
        default_poll_interval: Duration::from_secs(5),
        progress: ProgressKind::Percent,
    },
];

/// Progress as reported by the engine for a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseProgress {
    Percent(u8),
    Running(bool),
}

impl PhaseProgress {
    pub fn is_complete(&self) -> bool {
        match self {
            PhaseProgress::Percent(p) => *p >= 100,
            PhaseProgress::Running(running) => !running,
        }
    }

    /// Best-effort percentage; flag-only phases report 0 until done.
    pub fn percent(&self) -> u8 {
        match self {
            PhaseProgress::Percent(p) => (*p).min(100),
            PhaseProgress::Running(true) => 0,
            PhaseProgress::Running(false) => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
}

/// Engine-side job handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters passed through to phase submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRequest {
    pub target_url: String,
    pub context_name: String,
    pub context_id: String,
    pub depth: Option<u32>,
    pub threads: Option<u32>,
    pub browser_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPhase {
    pub kind: PhaseKind,
    pub job_id: Option<JobId>,
    pub status: PhaseStatus,
    pub progress_percent: u8,
    /// Budget measured from submission.
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub polls: u32,
    /// Completed trivially because the phase was disabled.
    pub skipped: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanPhase {
    pub fn new(kind: PhaseKind, poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            kind,
            job_id: None,
            status: PhaseStatus::Pending,
            progress_percent: 0,
            deadline,
            poll_interval,
            polls: 0,
            skipped: false,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn skipped(kind: PhaseKind) -> Self {
        let now = Utc::now();
        Self {
            status: PhaseStatus::Completed,
            progress_percent: 100,
            skipped: true,
            started_at: Some(now),
            finished_at: Some(now),
            ..Self::new(kind, Duration::ZERO, Duration::ZERO)
        }
    }

    pub(crate) fn finish(&mut self, status: PhaseStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert_eq!(
            PhaseKind::ORDER,
            [PhaseKind::Spider, PhaseKind::AjaxSpider, PhaseKind::ActiveScan]
        );
    }

    #[test]
    fn test_default_poll_intervals() {
        assert_eq!(PhaseKind::Spider.definition().default_poll_interval, Duration::from_secs(10));
        assert_eq!(PhaseKind::AjaxSpider.definition().default_poll_interval, Duration::from_secs(10));
        assert_eq!(PhaseKind::ActiveScan.definition().default_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_definitions_match_kind() {
        for kind in PhaseKind::ORDER {
            assert_eq!(kind.definition().kind, kind);
        }
        assert_eq!(PhaseKind::AjaxSpider.definition().progress, ProgressKind::RunningFlag);
    }

    #[test]
    fn test_progress_completion() {
        assert!(PhaseProgress::Percent(100).is_complete());
        assert!(!PhaseProgress::Percent(99).is_complete());
        assert!(PhaseProgress::Running(false).is_complete());
        assert!(!PhaseProgress::Running(true).is_complete());
        assert_eq!(PhaseProgress::Percent(120).percent(), 100);
    }

    #[test]
    fn test_skipped_phase_is_completed() {
        let phase = ScanPhase::skipped(PhaseKind::AjaxSpider);
        assert_eq!(phase.status, PhaseStatus::Completed);
        assert!(phase.skipped);
        assert_eq!(phase.deadline, Duration::ZERO);
    }

    #[test]
    fn test_phase_kind_display() {
        assert_eq!(PhaseKind::AjaxSpider.to_string(), "ajax-spider");
        assert_eq!(PhaseKind::ActiveScan.to_string(), "active-scan");
    }
}
