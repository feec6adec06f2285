use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use streamconf::StreamConfig;
use streaman::{telemetry, web};
use streamrec::Recorder;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for interrupted captures to finish their files.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Record live streams to disk from a web page
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to layer over /etc/streaman/config.toml and
    /// ~/.config/streaman/config.toml (default: ./streaman.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory recordings are written to and served from
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address to listen on, e.g. ":3000" or "127.0.0.1:8080"
    #[arg(long)]
    listen_address: Option<String>,

    /// HTTP path prefix, e.g. "/streaman"
    #[arg(long)]
    prefix: Option<String>,

    /// Never transcode, even when requested
    #[arg(long)]
    no_encode: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut StreamConfig) {
        if let Some(dir) = &self.data_dir {
            config.paths.data_dir = dir.clone();
        }
        if let Some(listen) = &self.listen_address {
            config.bind.listen = listen.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.bind.prefix = prefix.clone();
        }
        if self.no_encode {
            config.capture.allow_transcode = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = StreamConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);

    if cli.print_config {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    let telemetry = telemetry::init(&config.telemetry).context("Failed to initialize telemetry")?;

    for file in &sources.files {
        tracing::info!("Loaded config from {}", file.display());
    }
    for var in &sources.env_overrides {
        tracing::info!("Config override from environment: {}", var);
    }

    let data_dir = config.paths.data_dir.clone();
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
    tracing::info!("Recording into {}", data_dir.display());

    let recorder = Recorder::from_config(&config);
    let state = web::WebState::new(
        recorder.clone(),
        recorder.data_dir(),
        config.capture.allow_transcode,
    )
    .context("Failed to compile page template")?;

    let prefix = config.bind.normalized_prefix();
    let app = web::router(state, &prefix);

    let addr = config.bind.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Streaman listening on http://{}{}/", addr, prefix);
    tracing::info!("   Health: GET http://{}/health", addr);
    if !config.capture.allow_transcode {
        tracing::info!("   Transcoding disabled");
    }

    let shutdown_token = CancellationToken::new();
    let shutdown_token_srv = shutdown_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_token_srv.cancelled().await;
        tracing::info!("Server shutdown signal received");
    });

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!("Server shutdown with error: {:?}", e);
        }
    });

    wait_for_signal().await;
    shutdown_token.cancel();

    if config.capture.stop_on_shutdown {
        stop_recordings(&recorder).await;
    }

    if let Err(e) = server_task.await {
        tracing::error!("Server task failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    telemetry.shutdown();

    Ok(())
}

/// Handle both SIGINT (Ctrl+C) and SIGTERM (systemd, containers)
async fn wait_for_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate() => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Interrupt every capture and give the encoders a moment to close their
/// output files.
async fn stop_recordings(recorder: &Recorder) {
    let mut events = recorder.subscribe();
    let signalled = recorder.stop_all();
    if signalled == 0 {
        return;
    }

    let wait = async {
        while recorder.stats().active > 0 {
            if let Err(RecvError::Closed) = events.recv().await {
                break;
            }
        }
    };

    if tokio::time::timeout(SHUTDOWN_GRACE, wait).await.is_err() {
        tracing::warn!(
            active = recorder.stats().active,
            "Captures still running after shutdown grace period"
        );
    }
}
