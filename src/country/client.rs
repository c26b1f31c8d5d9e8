//! countrylayer API client.

use async_trait::async_trait;
use log::debug;
use std::fmt;

use crate::http::{Method, RequestError, RequestOptions, ServiceClient, ServiceRequest, ServiceResponse};

use super::{CountryError, CountryLookup, CountryRecord, validate};

/// Public countrylayer API root.
pub const COUNTRY_LAYER_API_URL: &str = "https://api.countrylayer.com/v2/";

/// Query parameter carrying the API key.
pub const ACCESS_KEY_PARAM: &str = "access_key";

/// Endpoint for a name lookup. The name is percent-encoded as one path segment.
///
/// Returns `None` for names that cannot be addressed as a segment: blank
/// names, and `.` or `..`, which URL resolution treats as dot-segments even
/// when percent-encoded.
pub fn country_endpoint(name: &str) -> Option<String> {
    if name.trim().is_empty() || matches!(name, "." | "..") {
        return None;
    }
    Some(format!("name/{}", urlencoding::encode(name)))
}

/// Mirrors Python truthiness, which is how the upstream signals "no match".
fn is_empty_payload(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
    }
}

/// Client for the countrylayer API.
///
/// Wraps any [`ServiceRequest`] and adds the API key to every request, so it
/// can itself be used wherever a `ServiceRequest` is expected.
pub struct CountryLayerClient<S: ServiceRequest = ServiceClient> {
    service: S,
    api_key: String,
}

impl<S: ServiceRequest> CountryLayerClient<S> {
    pub fn new(service: S, api_key: impl Into<String>) -> Self {
        Self {
            service,
            api_key: api_key.into(),
        }
    }

    fn default_options() -> RequestOptions {
        RequestOptions::new().header("Content-Type", "application/json")
    }
}

impl<S: ServiceRequest + fmt::Debug> fmt::Debug for CountryLayerClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountryLayerClient")
            .field("service", &self.service)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl<S: ServiceRequest> ServiceRequest for CountryLayerClient<S> {
    async fn make_request(
        &self,
        endpoint: &str,
        method: Method,
        mut options: RequestOptions,
    ) -> Result<ServiceResponse, RequestError> {
        // The configured key always replaces a caller-supplied one.
        options
            .params
            .insert(ACCESS_KEY_PARAM.to_string(), self.api_key.clone());
        self.service.make_request(endpoint, method, options).await
    }
}

#[async_trait]
impl<S: ServiceRequest> CountryLookup for CountryLayerClient<S> {
    #[tracing::instrument(skip(self))]
    async fn get_country_by_name(&self, name: &str) -> Result<Vec<CountryRecord>, CountryError> {
        let Some(endpoint) = country_endpoint(name) else {
            debug!("Unaddressable country name {:?}, skipping upstream request", name);
            return Err(CountryError::CountryNotFound);
        };

        let response = self
            .make_request(&endpoint, Method::Get, Self::default_options())
            .await?;

        let payload: serde_json::Value = response.json()?;
        if is_empty_payload(&payload) {
            debug!("Empty payload for country {:?}", name);
            return Err(CountryError::CountryNotFound);
        }

        let records = validate(&payload)?;
        debug!("Validated {} record(s) for country {:?}", records.len(), name);
        Ok(records)
    }
}
