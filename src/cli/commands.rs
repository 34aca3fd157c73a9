use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::session::AuthMethod;

#[derive(Parser)]
#[command(name = "dastctl", version, about = "Dynamic application security testing orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress bars and the summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scan against a target and enforce the finding policy
    Scan(ScanArgs),
    /// Stop a leftover engine container
    Stop(StopArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct ScanArgs {
    /// Target web application URL
    #[arg(short, long)]
    pub target: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory for findings
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Authentication method
    #[arg(short = 'a', long, value_enum)]
    pub auth_method: Option<AuthMethod>,

    /// Login username (form/oauth); `$VAR` reads the environment
    #[arg(short, long)]
    pub username: Option<String>,

    /// Login password (form/oauth); `$VAR` reads the environment
    #[arg(short, long)]
    pub password: Option<String>,

    /// Bearer token (token auth)
    #[arg(long)]
    pub token: Option<String>,

    /// Semicolon-separated name=value pairs (cookie auth)
    #[arg(long)]
    pub cookies: Option<String>,

    /// Login form URL (form/oauth)
    #[arg(long)]
    pub auth_url: Option<String>,

    /// Form field carrying the username
    #[arg(long)]
    pub login_field: Option<String>,

    /// Form field carrying the password
    #[arg(long)]
    pub password_field: Option<String>,

    /// Spider maximum crawl depth
    #[arg(short, long)]
    pub depth: Option<u32>,

    /// Scanner threads
    #[arg(short = 'T', long)]
    pub threads: Option<u32>,

    /// Overall time budget for the spider and active scan, in seconds
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Spider deadline override, in seconds
    #[arg(long)]
    pub spider_timeout: Option<u64>,

    /// Active scan deadline override, in seconds
    #[arg(long)]
    pub active_scan_timeout: Option<u64>,

    /// Run the AJAX spider phase
    #[arg(long, conflicts_with = "no_ajax_spider")]
    pub ajax_spider: bool,

    /// Skip the AJAX spider phase
    #[arg(long)]
    pub no_ajax_spider: bool,

    /// AJAX spider time budget, in seconds
    #[arg(long)]
    pub ajax_max_duration: Option<u64>,

    /// Fail when High+Critical findings exceed --max-high
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub fail_on_high: Option<bool>,

    /// Fail when Medium findings exceed --max-medium
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub fail_on_medium: Option<bool>,

    /// Allowed High+Critical findings
    #[arg(long)]
    pub max_high: Option<usize>,

    /// Allowed Medium findings
    #[arg(long)]
    pub max_medium: Option<usize>,

    /// Allowed Low findings (unchecked when omitted)
    #[arg(long)]
    pub max_low: Option<usize>,

    /// Allowed Informational findings (unchecked when omitted)
    #[arg(long)]
    pub max_info: Option<usize>,

    /// Use an engine that is already running at this URL
    #[arg(long)]
    pub engine_url: Option<String>,

    /// Engine container image
    #[arg(long)]
    pub engine_image: Option<String>,

    /// Host port for the engine API
    #[arg(long)]
    pub engine_port: Option<u16>,

    /// Run against a simulated in-process engine
    #[arg(long)]
    pub dry_run: bool,

    /// Custom scan identifier
    #[arg(long)]
    pub scan_id: Option<String>,

    /// Engine context name
    #[arg(long)]
    pub context_name: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct StopArgs {
    /// Engine container name
    #[arg(long, default_value = crate::config::DEFAULT_CONTAINER_NAME)]
    pub container: String,

    /// Also remove the container
    #[arg(long)]
    pub remove: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: PathBuf,
}
