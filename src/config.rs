//! Runtime configuration.
//!
//! Values come from the process environment, after `.env` has been loaded by
//! `main`. Every setting has a local-development default.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_REDIRECT_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the invoice REST API, without a trailing slash.
    pub api_base: String,
    /// Bearer token forwarded to the REST API.
    pub api_token: Option<String>,
    pub bind_addr: String,
    /// Delay before the UI should leave the screen after a successful save.
    pub redirect_delay: Duration,
    pub max_upload_bytes: usize,
    /// Client-side OCR timeout. `None` leaves it to the HTTP stack.
    pub ocr_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_string(),
            api_token: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            ocr_timeout: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_base = get("INVOICE_API_URL")
            .or_else(|| get("REACT_APP_API_URL"))
            .unwrap_or(defaults.api_base);
        let api_base = api_base.trim().trim_end_matches('/').to_string();

        let redirect_delay = match get("REDIRECT_DELAY_MS") {
            Some(v) => Duration::from_millis(
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("REDIRECT_DELAY_MS is not a number: {}", v))?,
            ),
            None => defaults.redirect_delay,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_MB") {
            Some(v) => {
                let mb = v
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("MAX_UPLOAD_MB is not a number: {}", v))?;
                mb * 1024 * 1024
            }
            None => defaults.max_upload_bytes,
        };

        let ocr_timeout = get("OCR_TIMEOUT_SECS")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("OCR_TIMEOUT_SECS is not a number: {}", v))
            })
            .transpose()?;

        let config = Self {
            api_base,
            api_token: get("API_TOKEN"),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            redirect_delay,
            max_upload_bytes,
            ocr_timeout,
        };

        info!(
            "Config: api_base={} bind_addr={} redirect_delay={:?} ocr_timeout={:?}",
            config.api_base, config.bind_addr, config.redirect_delay, config.ocr_timeout
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_URL);
        assert_eq!(config.redirect_delay, Duration::from_millis(2000));
        assert_eq!(config.ocr_timeout, None);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_react_app_url_fallback() {
        let config =
            AppConfig::from_lookup(lookup(&[("REACT_APP_API_URL", "https://api.example.com/")]))
                .unwrap();
        assert_eq!(config.api_base, "https://api.example.com");

        let config = AppConfig::from_lookup(lookup(&[
            ("REACT_APP_API_URL", "https://old.example.com"),
            ("INVOICE_API_URL", "https://new.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.api_base, "https://new.example.com");
    }

    #[test]
    fn test_numeric_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REDIRECT_DELAY_MS", "500"),
            ("MAX_UPLOAD_MB", "5"),
            ("OCR_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.redirect_delay, Duration::from_millis(500));
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.ocr_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_bad_number_is_error() {
        assert!(AppConfig::from_lookup(lookup(&[("REDIRECT_DELAY_MS", "soon")])).is_err());
    }
}
