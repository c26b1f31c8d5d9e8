//! Process-wide configuration for the countrylayer integration.

use anyhow::{Context, Result, anyhow};
use log::debug;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::country::{COUNTRY_LAYER_API_URL, CountryLayerClient};
use crate::http::{MAX_ATTEMPTS, RetryPolicy, ServiceClient, build_http_client};
use crate::runtime::Runtime;

pub const BASE_URL_VAR: &str = "COUNTRY_LAYER_BASE_URL";
pub const API_KEY_VAR: &str = "COUNTRY_LAYER_API_KEY";
pub const TIMEOUT_VAR: &str = "COUNTRY_LAYER_TIMEOUT_SECS";
pub const MAX_ATTEMPTS_VAR: &str = "COUNTRY_LAYER_MAX_ATTEMPTS";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Values that take precedence over the environment, e.g. from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<usize>,
}

#[derive(Clone)]
pub struct CountryLayerConfig {
    pub base_url: Url,
    pub api_key: String,
    /// `None` disables the request timeout.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl fmt::Debug for CountryLayerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountryLayerConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &mask_secret(&self.api_key))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CountryLayerConfig {
    /// Reads the configuration from the environment only.
    pub fn from_runtime<R: Runtime>(runtime: &R) -> Result<Self> {
        Self::resolve(runtime, ConfigOverrides::default())
    }

    /// Reads the configuration, preferring `overrides` over the environment.
    #[tracing::instrument(skip(runtime, overrides))]
    pub fn resolve<R: Runtime>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let raw_base_url = match overrides.base_url {
            Some(url) => url,
            None => runtime
                .env_var(BASE_URL_VAR)
                .unwrap_or_else(|_| COUNTRY_LAYER_API_URL.to_string()),
        };
        let base_url = parse_base_url(&raw_base_url)?;

        let api_key = overrides
            .api_key
            .or_else(|| runtime.env_var(API_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Missing API key. Set {} or pass --api-key.",
                    API_KEY_VAR
                )
            })?;

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => env_value(runtime, TIMEOUT_VAR)?.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        let max_attempts = match overrides.max_attempts {
            Some(attempts) => attempts,
            None => env_value(runtime, MAX_ATTEMPTS_VAR)?.unwrap_or(MAX_ATTEMPTS),
        };

        debug!(
            "Using {} for authentication: {}",
            API_KEY_VAR,
            mask_secret(&api_key)
        );

        Ok(Self {
            base_url,
            api_key,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            retry: RetryPolicy::default().attempts(max_attempts),
        })
    }

    /// Builds a ready-to-use countrylayer client from this configuration.
    pub fn build_client(&self) -> Result<CountryLayerClient<ServiceClient>> {
        let http_client = build_http_client(self.timeout).context("Failed to build HTTP client")?;
        let service = ServiceClient::new(http_client, self.base_url.clone()).with_retry(self.retry);
        Ok(CountryLayerClient::new(service, self.api_key.clone()))
    }
}

/// Parses the base URL and makes sure it ends with `/`, so relative
/// endpoints resolve below the configured path instead of replacing its
/// last segment.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .with_context(|| format!("Invalid {}: {:?}", BASE_URL_VAR, raw))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Invalid {}: {:?} cannot be used as a base URL", BASE_URL_VAR, raw);
    }
    Ok(url)
}

fn env_value<R, T>(runtime: &R, key: &str) -> Result<Option<T>>
where
    R: Runtime,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match runtime.env_var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, value)),
        Err(_) => Ok(None),
    }
}

/// Keeps only the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::ACCESS_KEY_PARAM;
    use crate::runtime::MockRuntime;
    use std::collections::HashMap;

    fn runtime_with(vars: &[(&str, &str)]) -> MockRuntime {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(move |key| vars.get(key).cloned().ok_or(std::env::VarError::NotPresent));
        runtime
    }

    #[test]
    fn test_from_runtime_defaults() {
        let runtime = runtime_with(&[(API_KEY_VAR, "0123456789abcdef")]);
        let config = CountryLayerConfig::from_runtime(&runtime).unwrap();

        assert_eq!(config.base_url.as_str(), COUNTRY_LAYER_API_URL);
        assert_eq!(config.api_key, "0123456789abcdef");
        assert_eq!(config.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_from_runtime_reads_all_variables() {
        let runtime = runtime_with(&[
            (API_KEY_VAR, "key"),
            (BASE_URL_VAR, "http://localhost:8080/v2"),
            (TIMEOUT_VAR, "0"),
            (MAX_ATTEMPTS_VAR, "5"),
        ]);
        let config = CountryLayerConfig::from_runtime(&runtime).unwrap();

        assert_eq!(config.base_url.as_str(), "http://localhost:8080/v2/");
        assert_eq!(config.timeout, None);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_overrides_win_over_environment() {
        let runtime = runtime_with(&[
            (API_KEY_VAR, "env-key"),
            (BASE_URL_VAR, "http://env.example.com/"),
            (TIMEOUT_VAR, "30"),
        ]);
        let overrides = ConfigOverrides {
            base_url: Some("http://cli.example.com/api/".into()),
            api_key: Some("cli-key".into()),
            timeout_secs: Some(3),
            max_attempts: Some(1),
        };
        let config = CountryLayerConfig::resolve(&runtime, overrides).unwrap();

        assert_eq!(config.base_url.as_str(), "http://cli.example.com/api/");
        assert_eq!(config.api_key, "cli-key");
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_missing_api_key() {
        let runtime = runtime_with(&[]);
        let err = CountryLayerConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(API_KEY_VAR));

        let runtime = runtime_with(&[(API_KEY_VAR, "  ")]);
        assert!(CountryLayerConfig::from_runtime(&runtime).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let runtime = runtime_with(&[(API_KEY_VAR, "key"), (BASE_URL_VAR, "not a url")]);
        let err = CountryLayerConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(BASE_URL_VAR));

        let runtime = runtime_with(&[(API_KEY_VAR, "key"), (BASE_URL_VAR, "mailto:a@b.c")]);
        assert!(CountryLayerConfig::from_runtime(&runtime).is_err());
    }

    #[test]
    fn test_invalid_numeric_values() {
        let runtime = runtime_with(&[(API_KEY_VAR, "key"), (TIMEOUT_VAR, "soon")]);
        let err = CountryLayerConfig::from_runtime(&runtime).unwrap_err();
        assert!(err.to_string().contains(TIMEOUT_VAR));

        let runtime = runtime_with(&[(API_KEY_VAR, "key"), (MAX_ATTEMPTS_VAR, "-1")]);
        assert!(CountryLayerConfig::from_runtime(&runtime).is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("short"), "*****");
        assert_eq!(mask_secret("0123456789abcdef"), "0123*********cdef");
    }

    #[test]
    fn test_debug_masks_api_key() {
        let runtime = runtime_with(&[(API_KEY_VAR, "0123456789abcdef")]);
        let config = CountryLayerConfig::from_runtime(&runtime).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("0123*********cdef"));
    }

    #[tokio::test]
    async fn test_build_client_sends_configured_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/name/France")
            .match_query(mockito::Matcher::UrlEncoded(
                ACCESS_KEY_PARAM.into(),
                "key".into(),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let base_url = format!("{}/v2", server.url());
        let runtime = runtime_with(&[(API_KEY_VAR, "key"), (BASE_URL_VAR, base_url.as_str())]);
        let config = CountryLayerConfig::from_runtime(&runtime).unwrap();
        let client = config.build_client().unwrap();

        let result = crate::country::CountryLookup::get_country_by_name(&client, "France").await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(crate::country::CountryError::CountryNotFound)
        ));
    }
}
