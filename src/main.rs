//! healthgate - a concurrent HTTP health-check aggregator
//!
//! Usage:
//!     healthgate --config <path> --listen <addr>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use healthgate::config::{Freshness, file_provider, load_config};
use healthgate::metrics::MetricsCollector;
use healthgate::server::HealthServer;
use healthgate::util::{LogFormat, ShutdownSignal, init_logging};
use healthgate::{HealthService, HttpProber};

/// A concurrent HTTP health-check aggregator.
#[derive(Parser, Debug)]
#[command(name = "healthgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (.toml or .yaml)
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Address to serve /health on
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:1337")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Reuse a loaded configuration for this long (e.g. "30s") instead of
    /// reading the file on every request
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    config_ttl: Option<Duration>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    // Fail fast on a broken configuration; each run still loads its own copy.
    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Endpoints: {}", config.endpoints.len());
        println!("  Concurrency: {}", config.probe.concurrency);
        println!("  Timeout: {}", humantime::format_duration(config.probe.timeout));
        println!("  Accepted statuses: {:?}", config.probe.accepted_statuses);
        for endpoint in &config.endpoints {
            match &endpoint.host {
                Some(host) => println!("    - {} (Host: {:?})", endpoint.url, host),
                None => println!("    - {}", endpoint.url),
            }
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        endpoints = config.endpoints.len(),
        concurrency = config.probe.concurrency,
        "healthgate starting"
    );

    run(cli)
}

/// Run the server with the given options.
fn run(cli: Cli) -> Result<()> {
    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(cli).await })
}

/// Async entry point for the server.
async fn run_async(cli: Cli) -> Result<()> {
    let shutdown = ShutdownSignal::new();

    let freshness = match cli.config_ttl {
        Some(ttl) => Freshness::Ttl(ttl),
        None => Freshness::Always,
    };
    let provider = file_provider(cli.config.clone(), freshness);
    let prober = HttpProber::new().context("failed to build the HTTP client")?;
    let service = Arc::new(HealthService::new(provider, prober, MetricsCollector::new()));

    let server = HealthServer::bind(cli.listen, service)
        .await
        .with_context(|| format!("failed to start health server on {}", cli.listen))?;

    let shutdown_rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(shutdown_rx).await;
    });

    info!(freshness = ?freshness, "healthgate is running");
    info!("press Ctrl+C to stop");

    shutdown.on_ctrl_c().await;
    if let Err(e) = handle.await {
        error!(error = %e, "health server task failed");
    }

    info!("healthgate shut down complete");
    Ok(())
}
