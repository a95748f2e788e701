//! Crew daemon: entry point for the matching service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use zeroize::Zeroizing;

use crew_daemon::config::{GatewayKind, Overrides, Secrets, ServiceConfig};
use crew_daemon::service::Service;
use crew_daemon::ShutdownController;
use crew_rpc::RpcServer;
use crew_store_lmdb::{check_data_dir, check_integrity, LmdbEnvironment};
use crew_types::{CoveragePolicy, SystemClock};
use crew_utils::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "crew-daemon", about = "Crew matching service daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CREW_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB environment.
    #[arg(long, env = "CREW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// HTTP API port.
    #[arg(long, env = "CREW_PORT")]
    port: Option<u16>,

    /// Log output: "human" or "json".
    #[arg(long, env = "CREW_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CREW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Hex SHA-256 digests of accepted operator tokens (comma-separated).
    #[arg(long, env = "CREW_OPERATOR_TOKEN_DIGESTS", value_delimiter = ',')]
    operator_token_digests: Vec<String>,

    /// Seconds between sweeps.
    #[arg(long, env = "CREW_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    /// Payment gateway: "stripe" or "null".
    #[arg(long, env = "CREW_GATEWAY")]
    gateway: Option<GatewayKind>,

    /// Venue reveal coverage: "operator", "full" or "minimum:<n>".
    #[arg(long, env = "CREW_COVERAGE")]
    coverage: Option<CoveragePolicy>,

    /// Let the sweep reveal venues once coverage is met.
    #[arg(long, env = "CREW_AUTO_REVEAL")]
    auto_reveal: bool,

    /// Shared secret for webhook signatures.
    #[arg(long, env = "CREW_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Secret API key for the payment gateway.
    #[arg(long, env = "CREW_GATEWAY_API_KEY", hide_env_values = true)]
    gateway_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the service.
    Run,
    /// Validate configuration and the data directory, then exit.
    Check,
    /// Print the effective configuration as TOML.
    PrintConfig,
}

impl Cli {
    fn overrides(&mut self) -> Overrides {
        Overrides {
            data_dir: self.data_dir.take(),
            listen_port: self.port,
            log_format: self.log_format,
            log_level: self.log_level.take(),
            operator_token_digests: std::mem::take(&mut self.operator_token_digests),
            sweep_interval_secs: self.sweep_interval,
            gateway: self.gateway,
            coverage: self.coverage,
            auto_reveal: self.auto_reveal,
            secrets: Secrets {
                webhook_secret: self.webhook_secret.take().map(Zeroizing::new),
                gateway_api_key: self.gateway_api_key.take().map(Zeroizing::new),
            },
        }
    }
}

fn load_config(cli: &mut Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_toml_file(path)?,
        None => ServiceConfig::default(),
    };
    config.apply(cli.overrides());
    config.validate()?;
    Ok(config)
}

fn open_store(config: &ServiceConfig) -> anyhow::Result<LmdbEnvironment> {
    check_data_dir(&config.data_dir).map_err(anyhow::Error::msg)?;
    let env = LmdbEnvironment::open(&config.data_dir, config.map_size_bytes())
        .with_context(|| format!("opening {}", config.data_dir.display()))?;

    let report = check_integrity(&env)?;
    if !report.is_healthy() {
        for error in &report.errors {
            tracing::error!(%error, "integrity check");
        }
        bail!("data directory failed the integrity check ({} errors)", report.errors.len());
    }
    tracing::info!(
        databases = report.databases_checked,
        entries = report.total_entries,
        "integrity check passed"
    );
    Ok(env)
}

fn start_service(config: &ServiceConfig) -> anyhow::Result<Service<LmdbEnvironment>> {
    init_logging(config.log_format, &config.log_level)?;
    let store = Arc::new(open_store(config)?);
    Ok(Service::build(config, store, Arc::new(SystemClock))?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    let config = load_config(&mut cli)?;

    match cli.command {
        Command::PrintConfig => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Check => {
            start_service(&config)?;
            tracing::info!("configuration and data directory are valid");
        }
        Command::Run => {
            let service = start_service(&config)?;
            tracing::info!(
                port = config.listen_port,
                gateway = %config.gateway.kind,
                coverage = %config.lifecycle.coverage,
                auto_reveal = config.lifecycle.auto_reveal,
                "starting crew daemon"
            );

            let shutdown = Arc::new(ShutdownController::new());
            let sweeper = service.sweeper(Duration::from_secs(config.sweep_interval_secs));
            let sweeper_task = tokio::spawn(sweeper.run(shutdown.subscribe()));

            let signals = shutdown.clone();
            tokio::spawn(async move { signals.wait_for_signal().await });

            let server = RpcServer::new(config.listen_port, service.state.clone());
            let served = server.start(shutdown.signalled()).await;
            // Stop the sweeper even when the listener failed to bind.
            shutdown.shutdown();
            if let Err(e) = sweeper_task.await {
                tracing::warn!(error = %e, "sweeper task ended abnormally");
            }
            served.context("HTTP server")?;

            tracing::info!("crew daemon exited cleanly");
        }
    }

    Ok(())
}
