//! Gateway server entry point

use std::net::SocketAddr;

use clap::Parser;

use llm_gateway_config::{ConfigStore, UserConfig};
use llm_gateway_server::{create_router, AppState};

/// Protocol-translating LLM gateway.
#[derive(Debug, Parser)]
#[command(name = "llm-gateway", version)]
struct Cli {
    /// Configuration directory (positional form).
    config_directory_pos: Option<String>,

    /// User to serve (positional form).
    user_pos: Option<String>,

    /// Configuration directory.
    #[arg(long = "ConfigDirectory")]
    config_directory: Option<String>,

    /// User to serve.
    #[arg(long = "User")]
    user: Option<String>,

    /// Logging directory; `<user>` is replaced with the selected user.
    #[arg(long = "LoggingDirectory")]
    logging_directory: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_directory = cli
        .config_directory
        .or(cli.config_directory_pos)
        .unwrap_or_else(|| "Configs".to_string());
    let user = cli
        .user
        .or(cli.user_pos)
        .unwrap_or_else(|| "default".to_string());
    let logging_directory = cli
        .logging_directory
        .unwrap_or_else(|| "logs".to_string())
        .replace("<user>", &user);

    init_tracing();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_directory = %config_directory,
        user = %user,
        logging_directory = %logging_directory,
        "Starting llm-gateway"
    );

    let store = ConfigStore::new(&config_directory, &user);
    let user_config: UserConfig = store.load_user().map_err(|err| {
        tracing::error!(error = %err, "Failed to load user configuration");
        err
    })?;

    let state = AppState::new(store, user_config.clone());
    tracing::info!(instance_id = %state.instance_id, "Initialized application state");

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], user_config.port));
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "llm_gateway=info,tower_http=debug".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
