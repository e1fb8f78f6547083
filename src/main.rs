use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use longpoll_core::{Credential, InboundMessage, SessionName};
use longpoll_engine::{DeliveryEngine, EngineConfig, EventSink, SessionRegistry};
use longpoll_server::ServerConfig;
use longpoll_settings::LongpollSettings;
use longpoll_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "longpoll", about = "Loopback long-poll message relay")]
struct Cli {
    /// Settings file (defaults to ~/.longpoll/settings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

/// Sink for the standalone binary: every event becomes a log line.
struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn on_message(&self, message: InboundMessage) -> anyhow::Result<()> {
        tracing::info!(
            session = %message.session,
            kind = %message.kind,
            data = %message.data,
            "message received"
        );
        Ok(())
    }

    async fn on_lost_client(&self, session: &SessionName) -> anyhow::Result<()> {
        tracing::warn!(%session, "client lost");
        Ok(())
    }

    async fn on_connect_client(&self, session: &SessionName) -> anyhow::Result<()> {
        tracing::info!(%session, "client connected");
        Ok(())
    }
}

fn load(cli: &Cli) -> anyhow::Result<LongpollSettings> {
    let mut settings = match &cli.config {
        Some(path) => longpoll_settings::load_settings_from_path(path)?,
        None => longpoll_settings::load_settings()?,
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

fn build_engine(settings: &LongpollSettings) -> anyhow::Result<DeliveryEngine> {
    let registry = SessionRegistry::new(
        settings
            .clients
            .iter()
            .map(|c| (SessionName::new(c.name.as_str()), Credential::new(c.token.as_str()))),
    )?;
    if registry.is_empty() {
        tracing::warn!("no clients configured, every request will be refused");
    }
    let config = EngineConfig {
        poll_timeout: settings.delivery.poll_timeout(),
        sweep_interval: settings.delivery.sweep_interval(),
    };
    Ok(DeliveryEngine::new(registry, Arc::new(LogSink), config))
}

async fn run(settings: LongpollSettings) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(&settings)?);
    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        path: settings.server.path.clone(),
        request_timeout: settings.server.request_timeout(),
    };

    let handle = longpoll_server::start(config, engine).await?;
    tracing::info!(port = handle.port, "longpoll ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let telemetry = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(m, l)| (m.as_str(), l.as_str())),
        settings.logging.json,
    );
    init_telemetry(&telemetry)?;

    if let Err(e) = run(settings).await {
        tracing::error!(error = %e, "longpoll exited with error");
        return Err(e);
    }
    Ok(())
}
