//! reqwest-backed implementation of [`ServiceRequest`].

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, redirect};
use std::time::Duration;
use url::Url;

use super::retry::RetryPolicy;
use super::{Method, RequestError, RequestOptions, ServiceRequest, ServiceResponse};

const USER_AGENT: &str = concat!("countrylayer/", env!("CARGO_PKG_VERSION"));

/// Builds the reqwest client used for outbound integrations.
///
/// Redirects are not followed, so a 3xx response reaches the caller as-is.
/// `None` disables the request timeout.
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::none());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Maps a status code and its body onto the request outcome.
///
/// 4xx bodies are parsed as JSON to extract a `message`; 5xx bodies are
/// ignored. Every other status is a success.
pub fn classify(status: StatusCode, body: &[u8]) -> Result<(), RequestError> {
    if status.is_client_error() {
        return match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(json) => {
                let detail = match json.get("message") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(message)) => Some(message.clone()),
                    Some(other) => Some(other.to_string()),
                };
                Err(RequestError::ClientRequest { status, detail })
            }
            Err(_) => Err(RequestError::UnparsableClientError { status }),
        };
    }

    if status.is_server_error() {
        return Err(RequestError::UpstreamServer { status });
    }

    Ok(())
}

/// Request client bound to a single base URL.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl ServiceClient {
    /// Creates a client for `base_url` that attempts every request once.
    pub fn new(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            retry: RetryPolicy::none(),
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolves `endpoint` against the base URL with standard URL-join rules.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(endpoint)
            .map_err(|source| RequestError::InvalidUrl {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    /// Single attempt without retry.
    async fn send_once(
        &self,
        url: &Url,
        method: Method,
        options: &RequestOptions,
    ) -> Result<ServiceResponse, RequestError> {
        // reqwest errors carry the full URL, query string and API key included.
        let transport = |source: reqwest::Error| RequestError::Transport {
            url: url.to_string(),
            source: source.without_url(),
        };

        let mut request = self.client.request(method.into(), url.clone());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.params.is_empty() {
            request = request.query(&options.params);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?;

        debug!("{} {} -> {}", method, url, status);
        classify(status, &body)?;

        Ok(ServiceResponse::new(status, headers, body.to_vec()))
    }
}

#[async_trait]
impl ServiceRequest for ServiceClient {
    #[tracing::instrument(skip(self, options))]
    async fn make_request(
        &self,
        endpoint: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<ServiceResponse, RequestError> {
        let url = self.endpoint_url(endpoint)?;
        debug!("{} {}...", method, url);

        let operation = format!("{} {}", method, url);
        self.retry
            .run(&operation, || self.send_once(&url, method, &options))
            .await
    }
}
