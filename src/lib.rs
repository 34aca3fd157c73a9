pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod reporting;
pub mod session;

/// Version stamped into findings documents.
pub fn scanner_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Version line with build metadata, e.g. `1.0.0 (a1b2c3d, 2026-10-16T09:00:00+00:00)`.
pub fn build_info() -> String {
    let git_hash = option_env!("GIT_HASH").unwrap_or("dev");
    let build_ts = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown");
    format!("{} ({}, {})", scanner_version(), git_hash, build_ts)
}
