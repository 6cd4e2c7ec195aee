//! Main entry point for the rendezvous matchmaking pipeline
//!
//! One binary, two roles: `director` runs the control loop and
//! `match-function` serves the streaming match function endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rendezvous::config::{parse_regions, validate_config, AppConfig, MatchSourceKind};
use rendezvous::service::{Application, ServiceRole};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Rendezvous - skill and latency based matchmaking director
#[derive(Parser)]
#[command(
    name = "rendezvous",
    version,
    about = "Matchmaking director and match function for dedicated game servers",
    long_about = "Rendezvous pulls waiting players from a ticket store, groups them into \
                 skill-ordered matches per region, allocates a game server for each match \
                 and writes the connection string back onto the matched tickets."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        global = true,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health port override
    #[arg(long, global = true, value_name = "PORT", help = "Override health/metrics server port")]
    health_port: Option<u16>,

    /// Query the health endpoint of a running instance and exit
    #[arg(long, global = true, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Enable debug mode
    #[arg(short, long, global = true, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        global = true,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the director control loop
    Director {
        /// Seconds between ticks
        #[arg(long, value_name = "SECONDS")]
        poll_interval: Option<u64>,

        /// Comma separated list of regions to build profiles for
        #[arg(long, value_name = "REGIONS")]
        regions: Option<String>,

        /// Where proposals come from: backend or in_process
        #[arg(long, value_name = "SOURCE")]
        match_source: Option<MatchSourceKind>,
    },
    /// Serve the match function endpoint
    MatchFunction {
        /// Port to serve the run endpoint on
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,

        /// Tickets grouped into each match
        #[arg(long, value_name = "COUNT")]
        tickets_per_match: Option<usize>,
    },
}

impl Command {
    fn role(&self) -> ServiceRole {
        match self {
            Command::Director { .. } => ServiceRole::Director,
            Command::MatchFunction { .. } => ServiceRole::MatchFunction,
        }
    }
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Ask a running instance for its health and exit with its verdict
async fn perform_health_check(config: &AppConfig) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", config.service.health_port);
    info!("Performing health check against {}", url);

    let client = reqwest::Client::builder()
        .timeout(config.open_match_timeout())
        .build()
        .context("Failed to create HTTP client")?;

    match client.get(&url).send().await {
        Ok(response) => {
            let healthy = response.status().is_success();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            println!(
                "Health Check: {} ({})",
                body["status"].as_str().unwrap_or("unknown"),
                body["role"].as_str().unwrap_or("unknown role")
            );
            std::process::exit(if healthy { 0 } else { 1 });
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig, role: ServiceRole) {
    info!("🚀 Rendezvous {}", role);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    match role {
        ServiceRole::Director => {
            info!("   Regions: {}", config.director.regions.join(", "));
            info!("   Poll interval: {}s", config.director.poll_interval_seconds);
            info!("   Match source: {}", config.director.match_source);
            info!("   Backend: {}", config.open_match.backend_url);
            info!("   Allocator: {}", config.allocator.url);
        }
        ServiceRole::MatchFunction => {
            info!("   Port: {}", config.match_function.port);
            info!("   Tickets per match: {}", config.match_function.tickets_per_match);
            info!("   Query service: {}", config.open_match.query_url);
        }
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration and apply CLI overrides, then validate the result
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    match &args.command {
        Command::Director {
            poll_interval,
            regions,
            match_source,
        } => {
            if let Some(seconds) = poll_interval {
                config.director.poll_interval_seconds = *seconds;
            }
            if let Some(regions) = regions {
                config.director.regions = parse_regions(regions);
            }
            if let Some(source) = match_source {
                config.director.match_source = *source;
            }
        }
        Command::MatchFunction {
            port,
            tickets_per_match,
        } => {
            if let Some(port) = port {
                config.match_function.port = *port;
            }
            if let Some(count) = tickets_per_match {
                config.match_function.tickets_per_match = *count;
            }
        }
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let role = args.command.role();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(&config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config, role);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config, role);

    info!("Initializing service components...");
    let mut app = match Application::new(config.clone(), role).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Rendezvous {} is running", role);
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    let shutdown_timeout = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, app.shutdown(shutdown_timeout)).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Rendezvous {} stopped", role);
    Ok(())
}
