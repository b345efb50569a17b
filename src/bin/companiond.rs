//! companiond: the companion daemon.
//!
//! Serves the chat API with Prometheus metrics and OpenTelemetry tracing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use companion::conversation::ConversationStore;
use companion::generator::HttpGenerator;
use companion::refresher::BackgroundRefresher;
use companion::resources::ProcfsSampler;
use companion::server::config::Config;
use companion::server::{AppState, router};
use companion::telemetry::{
    ExporterSelector, OtelMirror, PrometheusExposition, TelemetryContext, subscriber,
};
use companion::{CompanionError, PKG_VERSION};

/// Instrumented conversational companion service.
#[derive(Parser)]
#[command(name = "companiond")]
#[command(version = PKG_VERSION)]
#[command(about = "Companion chat service daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Address to bind to (overrides config and COMPANION_ADDRESS).
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(address) = args.address {
        config.server.address = address;
    }

    // Select the exporter with log-only output, then install the full subscriber
    let mut exporter = tracing::subscriber::with_default(subscriber::bootstrap(), || {
        ExporterSelector::new().select(&config.exporter_config())
    });
    subscriber::init(exporter.tracer().cloned())?;

    let exposition = match PrometheusExposition::install() {
        Ok(exposition) => Some(exposition),
        Err(e) => {
            warn!(error = %e, "metrics exposition unavailable");
            None
        }
    };

    let telemetry = Arc::new(
        TelemetryContext::builder(config.service.name.clone())
            .environment(config.service.environment.clone())
            .exporter(&exporter)
            .mirror(Arc::new(OtelMirror::new()))
            .build(),
    );
    telemetry.record_app_info();

    let mut generator = HttpGenerator::with_timeout(
        config.model.endpoint.clone(),
        config.model.name.clone(),
        Duration::from_secs(config.model.timeout_secs),
    )?;
    if let Some(prompt) = &config.model.system_prompt {
        generator = generator.system_prompt(prompt.clone());
    }

    let sampler = Arc::new(
        ProcfsSampler::new().cpu_window(Duration::from_millis(config.monitoring.cpu_window_ms)),
    );

    let shutdown = CancellationToken::new();
    let refresher = BackgroundRefresher::new(sampler.clone())
        .interval(Duration::from_secs(config.monitoring.refresh_interval_secs))
        .backoff(Duration::from_secs(config.monitoring.retry_backoff_secs))
        .spawn(shutdown.clone());

    let mut state = AppState::new(
        telemetry.clone(),
        Arc::new(ConversationStore::new(&config.store_config())),
        Arc::new(generator),
        sampler,
    );
    if let Some(exposition) = exposition {
        state = state.exposition(exposition);
    }

    // Parse address
    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| CompanionError::Configuration(format!("Invalid address: {e}")))?;

    info!(
        version = PKG_VERSION,
        %addr,
        service = telemetry.service_name(),
        environment = telemetry.environment(),
        exporter = %telemetry.exporter(),
        "companiond starting"
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    shutdown.cancel();
    if let Err(e) = refresher.await {
        warn!(error = %e, "resource refresher task failed");
    }
    exporter.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
