use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::cli::commands::ScanArgs;
use crate::cli::progress::ScanProgress;
use crate::config::credentials::{redact_cookies, resolve_optional};
use crate::config::{
    parse_config, EngineConfig, EngineMode, FileConfig, PhaseSettings, ScanConfig, DEFAULT_CONTEXT_NAME,
};
use crate::container::DockerRuntime;
use crate::engine::{EngineEndpoint, EngineRuntime, ExternalRuntime, ScanEngine, ScriptedEngine, ZapClient};
use crate::errors::DastError;
use crate::models::{PolicyThresholds, Severity};
use crate::pipeline::runner::{run_scan, ScanRun};
use crate::reporting::formatter::format_scan_summary;
use crate::reporting::{JsonFileSink, ResultSink};
use crate::session::{AuthConfig, AuthMethod, FormAuth};

const SIMULATED_ENGINE_URL: &str = "http://127.0.0.1:0/";

/// Run a scan and return the process exit code it maps to.
pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<i32, DastError> {
    let file_config = match &args.config {
        Some(path) => Some(parse_config(path).await?),
        None => None,
    };
    let config = Arc::new(build_scan_config(&args, file_config.as_ref())?);
    info!(
        scan_id = %config.scan_id,
        target = %config.target,
        auth = %config.auth.method(),
        engine = ?config.engine.mode,
        budget_secs = config.phases.total_budget().as_secs(),
        "Scan configured"
    );

    let cancel = CancellationToken::new();
    let _shutdown = cancel_on_shutdown(cancel.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        let mut ui = if quiet { None } else { Some(ScanProgress::new()) };
        while let Some(event) = rx.recv().await {
            if let Some(ui) = ui.as_mut() {
                ui.handle_event(&event);
            }
        }
    });

    let runtime = build_runtime(&config)?;
    let mode = config.engine.mode;
    let request_timeout = config.engine.request_timeout;
    let connect = move |endpoint: &EngineEndpoint| -> Result<Arc<dyn ScanEngine>, DastError> {
        match mode {
            EngineMode::Simulated => Ok(Arc::new(ScriptedEngine::demo())),
            EngineMode::Docker | EngineMode::External => {
                Ok(Arc::new(ZapClient::new(endpoint.api_url.as_str(), request_timeout)?))
            }
        }
    };
    let sinks: Vec<Arc<dyn ResultSink>> = vec![Arc::new(JsonFileSink::new(config.output_dir.clone()))];

    let result = run_scan(
        config.clone(),
        ScanRun { runtime, connect, sinks, event_tx: Some(tx), cancel_token: cancel },
    )
    .await;
    let _ = progress.await;

    let outcome = result?;
    if !quiet {
        println!("{}", format_scan_summary(&outcome.document));
        println!("  Results written to {}", config.output_dir.display());
    }
    Ok(outcome.exit_code())
}

/// Cancel `cancel` on Ctrl-C or, on unix, SIGTERM (CI cancellation,
/// `docker stop`). The SIGTERM handler is installed before this returns.
pub fn cancel_on_shutdown(cancel: CancellationToken) -> JoinHandle<()> {
    #[cfg(unix)]
    let sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            None
        }
    };

    tokio::spawn(async move {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let received = tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = terminate => "SIGTERM",
        };
        warn!(signal = received, "Interrupt received; stopping the scan");
        cancel.cancel();
    })
}

fn build_runtime(config: &ScanConfig) -> Result<Arc<dyn EngineRuntime>, DastError> {
    Ok(match config.engine.mode {
        EngineMode::Docker => Arc::new(DockerRuntime::new(&config.engine, &config.scan_id)?),
        EngineMode::External => {
            let url = config
                .engine
                .api_url
                .clone()
                .ok_or_else(|| DastError::Config("External engine mode requires --engine-url".into()))?;
            Arc::new(ExternalRuntime::new(url))
        }
        EngineMode::Simulated => Arc::new(ExternalRuntime::new(parse_engine_url(SIMULATED_ENGINE_URL)?)),
    })
}

fn parse_engine_url(raw: &str) -> Result<Url, DastError> {
    Url::parse(raw).map_err(|e| DastError::Config(format!("Invalid engine URL '{}': {}", raw, e)))
}

/// Validate the target: it must be an absolute http(s) URL with a host.
pub fn parse_target(raw: &str) -> Result<Url, DastError> {
    let url = Url::parse(raw.trim()).map_err(|e| DastError::InvalidTarget(format!("'{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DastError::InvalidTarget(format!("'{}': scheme must be http or https", raw)));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(DastError::InvalidTarget(format!("'{}': missing host", raw)));
    }
    Ok(url)
}

/// Fold CLI flags over the optional file configuration into one immutable
/// [`ScanConfig`]. CLI values win.
pub fn build_scan_config(args: &ScanArgs, file_config: Option<&FileConfig>) -> Result<ScanConfig, DastError> {
    let file = file_config.cloned().unwrap_or_default();
    let file_auth = file.authentication.as_ref();
    let file_scan = file.scan.clone().unwrap_or_default();
    let file_policy = file.policy.clone().unwrap_or_default();
    let file_engine = file.engine.clone().unwrap_or_default();

    let raw_target = args
        .target
        .clone()
        .or(file.target.clone())
        .ok_or_else(|| DastError::Config("A target URL is required (--target)".into()))?;
    let target = parse_target(&raw_target)?;

    let auth = build_auth(args, file_auth)?;
    auth.validate(target.as_str())?;

    let scan_id = args.scan_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Engine
    let mode = if args.dry_run {
        EngineMode::Simulated
    } else if args.engine_url.is_some() {
        EngineMode::External
    } else {
        file_engine.mode.unwrap_or(if file_engine.api_url.is_some() {
            EngineMode::External
        } else {
            EngineMode::Docker
        })
    };
    let defaults = EngineConfig::default();
    let mut engine = EngineConfig {
        mode,
        api_url: match args.engine_url.as_deref().or(file_engine.api_url.as_deref()) {
            Some(raw) => Some(parse_engine_url(raw)?),
            None => None,
        },
        image: args.engine_image.clone().or(file_engine.image).unwrap_or(defaults.image),
        container_name: file_engine.container_name.unwrap_or(defaults.container_name),
        host_port: args.engine_port.or(file_engine.port).unwrap_or(defaults.host_port),
        request_timeout: file_engine
            .request_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
        ..defaults
    };

    // Phases
    let max_duration = args.max_duration.or(file_scan.max_duration).unwrap_or(crate::config::DEFAULT_MAX_DURATION_SECS);
    if max_duration == 0 {
        return Err(DastError::Config("--max-duration must be greater than zero".into()));
    }
    let ajax_spider = if args.no_ajax_spider {
        false
    } else if args.ajax_spider {
        true
    } else {
        file_scan.ajax_spider.unwrap_or(true)
    };
    let phase_defaults = PhaseSettings::default();
    let mut phases = PhaseSettings {
        max_duration: Duration::from_secs(max_duration),
        spider_timeout: args.spider_timeout.or(file_scan.spider_timeout).map(Duration::from_secs),
        active_scan_timeout: args.active_scan_timeout.or(file_scan.active_scan_timeout).map(Duration::from_secs),
        ajax_spider,
        ajax_max_duration: args
            .ajax_max_duration
            .or(file_scan.ajax_max_duration)
            .map(Duration::from_secs)
            .unwrap_or(phase_defaults.ajax_max_duration),
        depth: args.depth.or(file_scan.depth).or(phase_defaults.depth),
        threads: args.threads.or(file_scan.threads).or(phase_defaults.threads),
        browser_id: file_scan.browser_id.unwrap_or(phase_defaults.browser_id.clone()),
        ..phase_defaults
    };

    if mode == EngineMode::Simulated {
        let tick = Duration::from_secs(1);
        phases.spider_poll_interval = tick;
        phases.ajax_poll_interval = tick;
        phases.active_scan_poll_interval = tick;
        engine.readiness_interval = Duration::from_millis(200);
    }

    // Policy
    let policy_defaults = PolicyThresholds::default();
    let mut limits = file_policy.limits.clone();
    if let Some(max_low) = args.max_low {
        limits.insert(Severity::Low, max_low);
    }
    if let Some(max_info) = args.max_info {
        limits.insert(Severity::Informational, max_info);
    }
    let policy = PolicyThresholds {
        limits,
        fail_on_high_critical: args
            .fail_on_high
            .or(file_policy.fail_on_high_critical)
            .unwrap_or(policy_defaults.fail_on_high_critical),
        max_high_critical: args
            .max_high
            .or(file_policy.max_high_critical)
            .unwrap_or(policy_defaults.max_high_critical),
        fail_on_medium: args
            .fail_on_medium
            .or(file_policy.fail_on_medium)
            .unwrap_or(policy_defaults.fail_on_medium),
        max_medium: args.max_medium.or(file_policy.max_medium).unwrap_or(policy_defaults.max_medium),
    };

    let output_dir = args
        .output
        .clone()
        .or(file.output.and_then(|o| o.directory))
        .unwrap_or_else(|| PathBuf::from("dast-results"));

    Ok(ScanConfig {
        scan_id,
        target,
        context_name: args
            .context_name
            .clone()
            .or(file.context_name)
            .unwrap_or_else(|| DEFAULT_CONTEXT_NAME.to_string()),
        auth,
        engine,
        phases,
        policy,
        output_dir,
    })
}

fn build_auth(args: &ScanArgs, file_auth: Option<&crate::config::AuthenticationFileConfig>) -> Result<AuthConfig, DastError> {
    let method = args
        .auth_method
        .or(file_auth.map(|a| a.method))
        .unwrap_or(AuthMethod::None);
    let pick = |cli: &Option<String>, file: Option<&Option<String>>| -> Option<String> {
        resolve_optional(cli.as_deref().or(file.and_then(|f| f.as_deref())))
    };

    let form = || FormAuth {
        auth_url: pick(&args.auth_url, file_auth.map(|a| &a.auth_url)),
        login_field: pick(&args.login_field, file_auth.map(|a| &a.login_field))
            .unwrap_or_else(|| crate::session::auth::DEFAULT_LOGIN_FIELD.to_string()),
        password_field: pick(&args.password_field, file_auth.map(|a| &a.password_field))
            .unwrap_or_else(|| crate::session::auth::DEFAULT_PASSWORD_FIELD.to_string()),
        username: pick(&args.username, file_auth.map(|a| &a.username)),
        password: pick(&args.password, file_auth.map(|a| &a.password)),
    };

    Ok(match method {
        AuthMethod::None => AuthConfig::None,
        AuthMethod::Form => AuthConfig::Form(form()),
        AuthMethod::Oauth => AuthConfig::OAuthFallback(form()),
        AuthMethod::Token => AuthConfig::Token {
            bearer_token: pick(&args.token, file_auth.map(|a| &a.token)).unwrap_or_default(),
        },
        AuthMethod::Cookie => {
            let cookies = pick(&args.cookies, file_auth.map(|a| &a.cookies)).unwrap_or_default();
            info!(cookies = %redact_cookies(&cookies), "Cookie authentication selected");
            AuthConfig::Cookie { name_value_pairs: cookies }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config_str, PolicyFileConfig};

    fn args(target: &str) -> ScanArgs {
        ScanArgs { target: Some(target.to_string()), ..Default::default() }
    }

    #[test]
    fn test_defaults() {
        let config = build_scan_config(&args("https://app.example.com"), None).unwrap();
        assert_eq!(config.context_name, "dast-scan-context");
        assert_eq!(config.phases.max_duration, Duration::from_secs(1800));
        assert!(config.phases.ajax_spider);
        assert_eq!(config.phases.depth, Some(5));
        assert_eq!(config.engine.mode, EngineMode::Docker);
        assert!(config.policy.fail_on_high_critical);
        assert_eq!(config.policy.max_high_critical, 0);
    }

    #[test]
    fn test_invalid_target() {
        let err = build_scan_config(&args("not a url"), None).unwrap_err();
        assert!(matches!(err, DastError::InvalidTarget(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(matches!(build_scan_config(&args("ftp://host/"), None), Err(DastError::InvalidTarget(_))));
    }

    #[test]
    fn test_missing_target() {
        let err = build_scan_config(&ScanArgs::default(), None).unwrap_err();
        assert!(matches!(err, DastError::Config(_)));
    }

    #[test]
    fn test_form_missing_username_is_config_error() {
        let scan = ScanArgs {
            auth_method: Some(AuthMethod::Form),
            auth_url: Some("https://app.example.com/login".into()),
            password: Some("pw".into()),
            ..args("https://app.example.com")
        };
        let err = build_scan_config(&scan, None).unwrap_err();
        assert!(matches!(err, DastError::Config(_)));
        assert!(err.to_string().contains("username"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_credentials_resolved_from_env() {
        std::env::set_var("DASTCTL_TEST_TOKEN", "tok-123");
        let scan = ScanArgs {
            auth_method: Some(AuthMethod::Token),
            token: Some("$DASTCTL_TEST_TOKEN".into()),
            ..args("https://app.example.com")
        };
        let config = build_scan_config(&scan, None).unwrap();
        std::env::remove_var("DASTCTL_TEST_TOKEN");
        assert_eq!(config.auth, AuthConfig::Token { bearer_token: "tok-123".into() });
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = parse_config_str(
            "target: https://file.example.com\nscan:\n  max_duration: 600\n  ajax_spider: false\npolicy:\n  max_medium: 7\n",
        )
        .unwrap();
        let scan = ScanArgs { max_duration: Some(60), ajax_spider: true, ..args("https://cli.example.com") };
        let config = build_scan_config(&scan, Some(&file)).unwrap();
        assert_eq!(config.target.host_str(), Some("cli.example.com"));
        assert_eq!(config.phases.max_duration, Duration::from_secs(60));
        assert!(config.phases.ajax_spider);
        assert_eq!(config.policy.max_medium, 7);
    }

    #[test]
    fn test_file_disables_ajax() {
        let file = FileConfig {
            target: Some("https://file.example.com".into()),
            scan: Some(crate::config::ScanFileConfig { ajax_spider: Some(false), ..Default::default() }),
            ..Default::default()
        };
        let config = build_scan_config(&ScanArgs::default(), Some(&file)).unwrap();
        assert!(!config.phases.ajax_spider);
    }

    #[test]
    fn test_policy_flags_and_limits() {
        let file = FileConfig {
            policy: Some(PolicyFileConfig {
                limits: [(Severity::Low, 50)].into_iter().collect(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let scan = ScanArgs {
            fail_on_high: Some(false),
            fail_on_medium: Some(true),
            max_medium: Some(2),
            max_info: Some(100),
            ..args("https://app.example.com")
        };
        let config = build_scan_config(&scan, Some(&file)).unwrap();
        assert!(!config.policy.fail_on_high_critical);
        assert!(config.policy.fail_on_medium);
        assert_eq!(config.policy.max_medium, 2);
        assert_eq!(config.policy.limits.get(&Severity::Low), Some(&50));
        assert_eq!(config.policy.limits.get(&Severity::Informational), Some(&100));
    }

    #[test]
    fn test_engine_url_selects_external() {
        let scan = ScanArgs { engine_url: Some("http://127.0.0.1:8080".into()), ..args("https://app.example.com") };
        let config = build_scan_config(&scan, None).unwrap();
        assert_eq!(config.engine.mode, EngineMode::External);
        assert!(build_runtime(&config).is_ok());
    }

    #[test]
    fn test_dry_run_uses_short_intervals() {
        let scan = ScanArgs { dry_run: true, ..args("https://app.example.com") };
        let config = build_scan_config(&scan, None).unwrap();
        assert_eq!(config.engine.mode, EngineMode::Simulated);
        assert_eq!(config.phases.poll_interval(crate::pipeline::PhaseKind::ActiveScan), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_max_duration_rejected() {
        let scan = ScanArgs { max_duration: Some(0), ..args("https://app.example.com") };
        assert!(matches!(build_scan_config(&scan, None), Err(DastError::Config(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_cancels_the_scan() {
        let cancel = CancellationToken::new();
        let _listener = cancel_on_shutdown(cancel.clone());

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled()).await.unwrap();
    }
}
