use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{PolicyThresholds, Severity};
use crate::pipeline::phase::PhaseKind;
use crate::session::AuthConfig;

pub const DEFAULT_CONTEXT_NAME: &str = "dast-scan-context";
pub const DEFAULT_MAX_DURATION_SECS: u64 = 1800;
pub const DEFAULT_AJAX_MAX_DURATION_SECS: u64 = 600;
pub const DEFAULT_DEPTH: u32 = 5;
pub const DEFAULT_THREADS: u32 = 5;
pub const DEFAULT_BROWSER_ID: &str = "chrome-headless";
pub const DEFAULT_ENGINE_IMAGE: &str = "ghcr.io/zaproxy/zaproxy:stable";
pub const DEFAULT_CONTAINER_NAME: &str = "dastctl-zap";
pub const DEFAULT_ENGINE_PORT: u16 = 8090;

/// How the engine process is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Start a container through the local Docker daemon.
    Docker,
    /// Attach to an engine already listening at `api_url`.
    External,
    /// In-process scripted engine (`--dry-run`).
    Simulated,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: EngineMode,
    pub api_url: Option<Url>,
    pub image: String,
    pub container_name: String,
    pub host_port: u16,
    pub readiness_interval: Duration,
    pub readiness_attempts: u32,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Docker,
            api_url: None,
            image: DEFAULT_ENGINE_IMAGE.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            host_port: DEFAULT_ENGINE_PORT,
            readiness_interval: Duration::from_secs(2),
            readiness_attempts: 30,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Timing and submission parameters of the three scan phases.
#[derive(Debug, Clone)]
pub struct PhaseSettings {
    pub max_duration: Duration,
    pub spider_timeout: Option<Duration>,
    pub active_scan_timeout: Option<Duration>,
    pub ajax_spider: bool,
    pub ajax_max_duration: Duration,
    pub spider_poll_interval: Duration,
    pub ajax_poll_interval: Duration,
    pub active_scan_poll_interval: Duration,
    /// Consecutive transport errors tolerated while polling one phase.
    pub max_poll_errors: u32,
    pub depth: Option<u32>,
    pub threads: Option<u32>,
    pub browser_id: String,
}

impl Default for PhaseSettings {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            spider_timeout: None,
            active_scan_timeout: None,
            ajax_spider: true,
            ajax_max_duration: Duration::from_secs(DEFAULT_AJAX_MAX_DURATION_SECS),
            spider_poll_interval: PhaseKind::Spider.definition().default_poll_interval,
            ajax_poll_interval: PhaseKind::AjaxSpider.definition().default_poll_interval,
            active_scan_poll_interval: PhaseKind::ActiveScan.definition().default_poll_interval,
            max_poll_errors: 3,
            depth: Some(DEFAULT_DEPTH),
            threads: Some(DEFAULT_THREADS),
            browser_id: DEFAULT_BROWSER_ID.to_string(),
        }
    }
}

impl PhaseSettings {
    pub fn enabled(&self, kind: PhaseKind) -> bool {
        match kind {
            PhaseKind::AjaxSpider => self.ajax_spider,
            PhaseKind::Spider | PhaseKind::ActiveScan => true,
        }
    }

    /// Time budget of a phase, measured from its submission.
    pub fn deadline(&self, kind: PhaseKind) -> Duration {
        match kind {
            PhaseKind::Spider => self.spider_timeout.unwrap_or(self.max_duration),
            PhaseKind::AjaxSpider => self.ajax_max_duration,
            PhaseKind::ActiveScan => self.active_scan_timeout.unwrap_or(self.max_duration),
        }
    }

    pub fn poll_interval(&self, kind: PhaseKind) -> Duration {
        match kind {
            PhaseKind::Spider => self.spider_poll_interval,
            PhaseKind::AjaxSpider => self.ajax_poll_interval,
            PhaseKind::ActiveScan => self.active_scan_poll_interval,
        }
    }

    /// Upper bound on the pipeline's polling time.
    pub fn total_budget(&self) -> Duration {
        PhaseKind::ORDER
            .iter()
            .filter(|k| self.enabled(**k))
            .map(|k| self.deadline(*k))
            .sum()
    }
}

/// Immutable settings of one scan run, built once at startup.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub scan_id: String,
    pub target: Url,
    pub context_name: String,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub phases: PhaseSettings,
    pub policy: PolicyThresholds,
    pub output_dir: PathBuf,
}

impl ScanConfig {
    pub fn new(scan_id: impl Into<String>, target: Url, auth: AuthConfig) -> Self {
        Self {
            scan_id: scan_id.into(),
            target,
            context_name: DEFAULT_CONTEXT_NAME.to_string(),
            auth,
            engine: EngineConfig::default(),
            phases: PhaseSettings::default(),
            policy: PolicyThresholds::default(),
            output_dir: PathBuf::from("dast-results"),
        }
    }
}

// ---------------------------------------------------------------------------
// YAML file layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FileConfig {
    pub target: Option<String>,
    pub context_name: Option<String>,
    pub authentication: Option<AuthenticationFileConfig>,
    pub scan: Option<ScanFileConfig>,
    pub policy: Option<PolicyFileConfig>,
    pub engine: Option<EngineFileConfig>,
    pub output: Option<OutputFileConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthenticationFileConfig {
    pub method: crate::session::AuthMethod,
    pub auth_url: Option<String>,
    pub login_field: Option<String>,
    pub password_field: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub cookies: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanFileConfig {
    pub max_duration: Option<u64>,
    pub spider_timeout: Option<u64>,
    pub active_scan_timeout: Option<u64>,
    pub ajax_spider: Option<bool>,
    pub ajax_max_duration: Option<u64>,
    pub depth: Option<u32>,
    pub threads: Option<u32>,
    pub browser_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PolicyFileConfig {
    pub fail_on_high_critical: Option<bool>,
    pub max_high_critical: Option<usize>,
    pub fail_on_medium: Option<bool>,
    pub max_medium: Option<usize>,
    #[serde(default)]
    pub limits: BTreeMap<Severity, usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineFileConfig {
    pub mode: Option<EngineMode>,
    pub api_url: Option<String>,
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub port: Option<u16>,
    pub request_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputFileConfig {
    pub directory: Option<PathBuf>,
}
