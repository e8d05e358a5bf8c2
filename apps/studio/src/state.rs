use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::editor::metrics::{default_page_layout, PageLayout, TextMetricsMeasurer};
use crate::editor::pagination::Measure;
use crate::editor::session::SessionRegistry;
use crate::editor::surface::EditorConfig;
use crate::enhance::rate_limit::RateLimiter;
use crate::enhance::EnhanceClient;
use crate::export::RenderClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    /// `None` when no API key is configured.
    pub enhancer: Option<EnhanceClient>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    /// `None` when no rendering service is configured.
    pub renderer: Option<RenderClient>,
    /// Page styling shared by measurement and export.
    pub layout: PageLayout,
    /// Measurement model shared by every session.
    pub measurer: Arc<dyn Measure>,
    pub editor: EditorConfig,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let enhancer = match &config.enhance_api_key {
            Some(key) => Some(
                EnhanceClient::new(config.enhance_api_url.clone(), key.clone())
                    .context("failed to build enhancement client")?,
            ),
            None => None,
        };
        let renderer = match &config.render_service_url {
            Some(url) => {
                Some(RenderClient::new(url.clone()).context("failed to build render client")?)
            }
            None => None,
        };
        let rate_limiter = RateLimiter::new(
            config.enhance_rate_limit,
            Duration::from_secs(config.enhance_rate_window_secs),
        );
        let layout = default_page_layout(config.page_font);
        let measurer = TextMetricsMeasurer::new(layout.clone());

        Ok(Self {
            sessions: SessionRegistry::default(),
            enhancer,
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),
            renderer,
            layout,
            measurer: Arc::new(measurer),
            editor: EditorConfig {
                idle_timeout: Duration::from_secs(config.session_idle_timeout_secs.max(1)),
                ..EditorConfig::default()
            },
            config,
        })
    }
}
