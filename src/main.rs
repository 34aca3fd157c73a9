use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dastctl::cli::{self, Cli, Commands, LogFormat};
use dastctl::config;
use dastctl::errors::DastError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(!cli.no_color).init(),
    }

    debug!(version = %dastctl::build_info(), "dastctl starting");

    let result = match cli.command {
        Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        Commands::Stop(args) => cli::stop::handle_stop(args).await.map(|()| 0),
        Commands::Validate(args) => handle_validate(args).await.map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", e.headline(), e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), DastError> {
    let file_config = config::parse_config(&args.config).await?;
    // Building the scan config applies the same checks as a real run.
    if file_config.target.is_some() {
        let scan_args = cli::commands::ScanArgs {
            config: Some(args.config.clone()),
            ..Default::default()
        };
        cli::scan::build_scan_config(&scan_args, Some(&file_config))?;
    }
    println!("Configuration is valid: {}", args.config.display());
    Ok(())
}
