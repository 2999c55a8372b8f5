//! Startup orchestration.
//!
//! # Order
//! 1. Capture the environment, load and validate configuration
//! 2. Initialise logging and (optionally) the metrics exporter
//! 3. Start the config watcher when requested
//! 4. Bind the listener, build the server, install signal handlers
//! 5. Serve until shutdown
//!
//! Any startup error is fatal.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::loader::load_with_env;
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, EnvSource};
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::{logging, metrics};
use crate::routing::resolver;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("--watch requires --config")]
    WatchWithoutConfig,
}

/// Command-line driven startup options.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_path: Option<PathBuf>,
    pub watch: bool,
}

/// Run the shield until a termination signal.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let env = EnvSource::from_process();
    let config = load_with_env(options.config_path.as_deref(), &env)?;

    logging::init_logging(&config.observability);

    let environment = config.environment.as_deref();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?options.config_path,
        bind_address = %config.listener.bind_address,
        environment = environment.unwrap_or("(legacy)"),
        bucket = %resolver::bucket_name(environment),
        mount_path = %resolver::mount_path(environment),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // validated as a socket address
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr)?;
        }
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (_watcher, config_updates) = if options.watch {
        let path = options
            .config_path
            .as_deref()
            .ok_or(StartupError::WatchWithoutConfig)?;
        let (watcher, updates) = ConfigWatcher::new(path, env.clone());
        (Some(watcher.run()?), updates)
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, env)?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
