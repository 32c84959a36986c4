use std::env;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;

use anyhow::anyhow;

use lectern::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration, from a YAML file when one is named
    let mut args = env::args();
    let _ = args.next();
    let config = match args.next() {
        Some(path) => {
            if let Some(extra) = args.next() {
                anyhow::bail!("Unexpected argument '{extra}' after config path");
            }
            ServerConfig::from_file(&PathBuf::from(path)).map_err(|e| anyhow!(e.to_string()))?
        }
        None => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?,
    };
    let address = config.address();
    println!("Starting server on {address}");

    // Create application state
    let app_state = AppState::new(config);

    // Combine all routes: health + websocket relay
    let app = Router::new()
        .merge(routes::api::create_api_router())
        .merge(routes::ws::create_ws_router())
        .with_state(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    println!("Server listening on {address}");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
