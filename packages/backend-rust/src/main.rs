use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;

use vocab_backend_rust::clock::{Clock, SystemClock};
use vocab_backend_rust::config::{Config, ConfigError};
use vocab_backend_rust::db::{self, DbInitError};
use vocab_backend_rust::logging::init_tracing;
use vocab_backend_rust::state::AppState;
use vocab_backend_rust::create_app;

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] DbInitError),
    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_tracing(&config.log_level, config.log_dir.as_deref());

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "backend stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let store = db::connect(&config.database).await?;
    let scheduler = config.algorithm.build();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    tracing::info!(algorithm = scheduler.name(), "scheduler selected");

    let state = AppState::new(Arc::clone(&store), scheduler, clock, config.review.clone());
    let app = create_app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "vocab-backend-rust listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("HTTP server stopped, closing database pool");
    store.close().await;
    served?;

    tracing::info!("graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
