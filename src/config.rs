use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::cache::DEFAULT_TTL;
use crate::services::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Longest accepted `CACHE_TTL_SECS`
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
/// Longest accepted Redis connect/operation timeout
pub const MAX_REDIS_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Origins allowed to call the API from a browser when `CORS_ORIGINS` is unset
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://frontend:5173",
    "https://carbon-estimation-frontend.onrender.com",
    "https://*.onrender.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub redis_connect_timeout: Duration,
    pub redis_operation_timeout: Duration,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
    /// Cache admin routes are only mounted when this is set
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;

        let cache_backend = match get("CACHE_BACKEND").as_deref() {
            None | Some("redis") => CacheBackend::Redis,
            Some("memory") => CacheBackend::Memory,
            Some(other) => anyhow::bail!(
                "CACHE_BACKEND must be \"redis\" or \"memory\", got {:?}",
                other
            ),
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cache_backend,
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            cache_ttl: secs(&get, "CACHE_TTL_SECS", DEFAULT_TTL, MAX_CACHE_TTL)?,
            redis_connect_timeout: secs(
                &get,
                "REDIS_CONNECT_TIMEOUT_SECS",
                Duration::from_secs(5),
                MAX_REDIS_TIMEOUT,
            )?,
            redis_operation_timeout: secs(
                &get,
                "REDIS_OPERATION_TIMEOUT_SECS",
                Duration::from_secs(2),
                MAX_REDIS_TIMEOUT,
            )?,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            cors_origins,
            admin_token: get("ADMIN_TOKEN"),
        })
    }
}

fn secs<F>(get: &F, key: &str, default: Duration, max: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, raw))?;
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            if secs > max.as_secs() {
                anyhow::bail!("{} must be at most {} seconds, got {}", key, max.as_secs(), secs);
            }
            Ok(Duration::from_secs(secs))
        }
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("OPENAI_API_KEY", "sk-test")]).unwrap();

        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.cache_ttl, Duration::from_secs(604_800));
        assert_eq!(config.cache_backend, CacheBackend::Redis);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.cors_origins.len(), DEFAULT_CORS_ORIGINS.len());
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let err = config(&[("OPENAI_API_KEY", "  ")]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("REDIS_URL", "redis://cache:6379/2"),
            ("CACHE_BACKEND", "memory"),
            ("CACHE_TTL_SECS", "60"),
            ("CORS_ORIGINS", "https://a.example.com/, https://*.example.org,"),
            ("ADMIN_TOKEN", "secret"),
        ])
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6379/2");
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example.com", "https://*.example.org"]
        );
        assert_eq!(config.admin_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("OPENAI_API_KEY", "k"), ("CACHE_TTL_SECS", "week")]).is_err());
        assert!(config(&[("OPENAI_API_KEY", "k"), ("CACHE_TTL_SECS", "0")]).is_err());
        assert!(config(&[("OPENAI_API_KEY", "k"), ("CACHE_BACKEND", "disk")]).is_err());
    }

    #[test]
    fn test_durations_are_bounded() {
        let err = config(&[
            ("OPENAI_API_KEY", "k"),
            ("CACHE_TTL_SECS", "18446744073709551615"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CACHE_TTL_SECS"));

        assert!(config(&[("OPENAI_API_KEY", "k"), ("REDIS_OPERATION_TIMEOUT_SECS", "86400")]).is_err());

        let config = config(&[("OPENAI_API_KEY", "k"), ("CACHE_TTL_SECS", "31536000")]).unwrap();
        assert_eq!(config.cache_ttl, MAX_CACHE_TTL);
    }
}
