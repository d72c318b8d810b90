//! Process configuration.
//!
//! Read once at startup and passed by value into each adapter. Nothing in the
//! crate reads the environment after [`SkyvernConfig::from_env`] returns.

use std::time::Duration;

use crate::error::{Error, Result};

/// Base URL of the Skyvern deployment.
pub const ENV_URL: &str = "SKYVERN_URL";
/// API key sent as `x-api-key`.
pub const ENV_API_KEY: &str = "SKYVERN_API_KEY";
/// Per-request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "SKYVERN_TIMEOUT_SECS";
/// OpenAPI document location (URL or file path).
pub const ENV_OPENAPI_URL: &str = "SKYVERN_OPENAPI_URL";

/// Public OpenAPI document used when no override is configured.
pub const DEFAULT_OPENAPI_URL: &str = "https://api.skyvern.com/openapi.json";

/// Timeout applied when `SKYVERN_TIMEOUT_SECS` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for the Skyvern API.
#[derive(Clone)]
pub struct SkyvernConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// API key.
    pub api_key: String,
    /// Timeout for every outbound request.
    pub timeout: Duration,
    /// Where the generated adapter loads its OpenAPI document from.
    pub openapi_spec: String,
}

impl std::fmt::Debug for SkyvernConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkyvernConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("openapi_spec", &self.openapi_spec)
            .finish()
    }
}

impl SkyvernConfig {
    /// Create a configuration with default timeout and spec location.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            openapi_spec: DEFAULT_OPENAPI_URL.to_string(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the OpenAPI document location.
    pub fn with_openapi_spec(mut self, spec: impl Into<String>) -> Self {
        self.openapi_spec = spec.into();
        self
    }

    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = get(ENV_URL).ok_or_else(|| missing(ENV_URL))?;
        let api_key = get(ENV_API_KEY).ok_or_else(|| missing(ENV_API_KEY))?;

        let mut config = Self::new(base_url.trim(), api_key);

        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                Error::Config(format!("invalid {ENV_TIMEOUT_SECS} '{raw}': {e}"))
            })?;
            if secs == 0 {
                return Err(Error::Config(format!(
                    "{ENV_TIMEOUT_SECS} must be greater than zero"
                )));
            }
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(spec) = get(ENV_OPENAPI_URL) {
            config.openapi_spec = spec.trim().to_string();
        }

        Ok(config)
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is not set"))
}
