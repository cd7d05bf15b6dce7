use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trusted_proxy::api::{self, ApiState};
use trusted_proxy::{Config, DeviceRouter, Registry, RegistryClient, build_coordinator};

/// Trusted Proxy - trust tokens and request proxying for registry devices
#[derive(Parser)]
#[command(name = "trusted-proxy", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "TRUSTED_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Registry port (overrides config)
    #[arg(long)]
    registry_port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,trusted_proxy=info",
        1 => "info,trusted_proxy=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.registry_port {
        config.registry.port = port;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    tracing::info!(
        registry = %config.registry.base_url(),
        prefix = %config.trust_group_prefix,
        worker_path = %config.worker_path,
        "starting trusted proxy"
    );

    let registry: Arc<dyn Registry> = Arc::new(RegistryClient::new(&config.registry)?);
    let router = Arc::new(DeviceRouter::new(Arc::clone(&registry), &config.router)?);
    let coordinator = build_coordinator(registry, router, &config.trust_group_prefix);

    let state = Arc::new(ApiState { coordinator });
    let app = api::app(state, &config.worker_path);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    api::serve(app, &addr, shutdown_signal()).await?;
    tracing::info!("trusted proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
