use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    /// Secondary base tried once when the primary answers with an HTML page
    pub api_base_fallback: Option<String>,
    pub cache_ttl_secs: u64,
    pub timeout_ms: u64,
    pub default_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080/api/v1".to_string(),
            api_base_fallback: None,
            cache_ttl_secs: 60,
            timeout_ms: 15_000,
            default_page_size: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("ADFLOW_API_BASE").unwrap_or(defaults.api_base),
            api_base_fallback: std::env::var("ADFLOW_API_BASE_FALLBACK")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            cache_ttl_secs: std::env::var("ADFLOW_CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.cache_ttl_secs),
            timeout_ms: std::env::var("ADFLOW_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.timeout_ms),
            default_page_size: std::env::var("ADFLOW_PAGE_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.default_page_size),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Rejects base URLs that reqwest could not address.
    pub fn validate(&self) -> Result<()> {
        check_base(&self.api_base)?;
        if let Some(fallback) = &self.api_base_fallback {
            check_base(fallback)?;
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("ADFLOW_TIMEOUT_MS must be positive"));
        }
        Ok(())
    }
}

fn check_base(base: &str) -> Result<()> {
    let url = Url::parse(base).map_err(|e| anyhow!("invalid base url {}: {}", base, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("unsupported scheme {} in {}", other, base)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.timeout(), Duration::from_millis(15_000));
        assert!(cfg.api_base_fallback.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base() {
        let cfg = Config {
            api_base: "not a url".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            api_base_fallback: Some("ftp://example.com/api".to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let cfg = Config {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
