mod configuration;
mod error;
mod routes;
mod state;

use concierge::SupportAgent;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A missing API key stops us here, before anything binds
    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr()?;

    let tools = settings.tools.source();
    info!(url = tools.url(), "using tool server");
    let agent = SupportAgent::from_config(settings.provider.into_config(), tools)?;

    if settings.server.preload_tools {
        match agent.initialize().await {
            Ok(()) => info!("tools loaded"),
            Err(e) => tracing::warn!("could not preload tools, retrying on first turn: {e:#}"),
        }
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state::AppState::new(agent)).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
