mod config;
mod editor;
mod enhance;
mod errors;
mod export;
mod routes;
mod state;
mod template;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Studio v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config.clone())?;
    match &state.enhancer {
        Some(_) => info!("Text enhancement enabled (model: {})", enhance::MODEL),
        None => info!("Text enhancement disabled: ENHANCE_API_KEY is not set"),
    }
    match &config.render_service_url {
        Some(url) => info!("PDF export via {url}"),
        None => info!("PDF export disabled: RENDER_SERVICE_URL is not set"),
    }
    info!(
        "Page layout: {:?} {}px, {}px content width",
        state.layout.font, state.layout.font_size_px, state.layout.content_width_px
    );

    state.sessions.spawn_reaper(state.editor.idle_timeout);
    info!(
        "Idle editing sessions close after {}s",
        state.editor.idle_timeout.as_secs()
    );

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
