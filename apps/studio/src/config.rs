use anyhow::{Context, Result};

use crate::editor::metrics::FontFamily;

const DEFAULT_ENHANCE_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Application configuration loaded from environment variables.
/// Enhancement and export are disabled when their credentials/URLs are unset.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub enhance_api_url: String,
    pub enhance_api_key: Option<String>,
    pub render_service_url: Option<String>,
    /// Enhancement requests allowed per client per window.
    pub enhance_rate_limit: usize,
    pub enhance_rate_window_secs: u64,
    pub page_font: FontFamily,
    /// Editing sessions idle this long are closed.
    pub session_idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rust_log: "info".to_string(),
            enhance_api_url: DEFAULT_ENHANCE_API_URL.to_string(),
            enhance_api_key: None,
            render_service_url: None,
            enhance_rate_limit: 10,
            enhance_rate_window_secs: 60,
            page_font: FontFamily::Inter,
            session_idle_timeout_secs: 30 * 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        let defaults = Config::default();

        Ok(Config {
            port: parse_env("PORT", defaults.port).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            enhance_api_url: std::env::var("ENHANCE_API_URL").unwrap_or(defaults.enhance_api_url),
            enhance_api_key: optional_env("ENHANCE_API_KEY"),
            render_service_url: optional_env("RENDER_SERVICE_URL"),
            enhance_rate_limit: parse_env("ENHANCE_RATE_LIMIT", defaults.enhance_rate_limit)
                .context("ENHANCE_RATE_LIMIT must be a positive integer")?,
            enhance_rate_window_secs: parse_env(
                "ENHANCE_RATE_WINDOW_SECS",
                defaults.enhance_rate_window_secs,
            )
            .context("ENHANCE_RATE_WINDOW_SECS must be a positive integer")?,
            page_font: match optional_env("PAGE_FONT") {
                Some(font) => font
                    .parse()
                    .map_err(anyhow::Error::msg)
                    .context("PAGE_FONT must name a supported font")?,
                None => defaults.page_font,
            },
            session_idle_timeout_secs: parse_env(
                "SESSION_IDLE_TIMEOUT_SECS",
                defaults.session_idle_timeout_secs,
            )
            .context("SESSION_IDLE_TIMEOUT_SECS must be a positive integer")?,
        })
    }
}

/// Unset or blank variables count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value '{raw}' for {key}")),
        None => Ok(default),
    }
}
