//! Generic request client shared by every third-party integration.
//!
//! Integrations issue requests through the [`ServiceRequest`] trait, so they
//! all get the same status classification: 2xx/3xx responses are returned
//! unchanged, 4xx responses become [`RequestError::ClientRequest`] (or
//! [`RequestError::UnparsableClientError`] when the body is not JSON) and
//! 5xx responses become [`RequestError::UpstreamServer`].

mod client;
mod error;
mod retry;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

pub use client::{ServiceClient, build_http_client, classify};
pub use error::{DEFAULT_CLIENT_DETAIL, RequestError, UPSTREAM_SERVER_DETAIL};
pub use retry::{BASE_DELAY_MS, MAX_ATTEMPTS, MAX_DELAY_MS, RetryPolicy};

/// HTTP methods supported by outbound integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Per-call headers, query parameters and optional JSON body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any previous value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter, replacing any previous value for the same key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ServiceResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Anything that can issue a request against a fixed base URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRequest: Send + Sync {
    /// Send `method` to `endpoint` (joined onto the base URL) and classify
    /// the response by status code.
    async fn make_request(
        &self,
        endpoint: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<ServiceResponse, RequestError>;
}
