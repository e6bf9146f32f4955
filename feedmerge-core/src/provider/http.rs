//! Blocking HTTP plumbing shared by the REST adapters.
//!
//! Every upstream failure (connect error, timeout, non-success status,
//! undecodable body) becomes `FetchError::TransportError` with the upstream
//! status and message preserved. URLs are stripped from reqwest errors because
//! some providers take the API key as a query parameter.

use super::FetchError;
use crate::config::{ConfigError, ProviderSettings};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 300;

pub(crate) struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub(crate) fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("feedmerge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL for a path on this provider's base URL.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether `url` lives under this provider's base URL. Pagination links
    /// are only followed (and credentials only attached) when this holds.
    pub(crate) fn is_own_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    /// Reject a pagination link that points away from the configured host.
    pub(crate) fn check_next_url(&self, url: &str) -> Result<(), FetchError> {
        if self.is_own_url(url) {
            Ok(())
        } else {
            Err(FetchError::transport(
                Some(200),
                "pagination link points outside the configured base URL",
            ))
        }
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Send a request. Only transport-level failures are errors here; the
    /// caller decides how to treat the status.
    pub(crate) fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        request.send().map_err(transport_error)
    }
}

/// Map a reqwest failure to a transport error without leaking the URL.
pub(crate) fn transport_error(e: reqwest::Error) -> FetchError {
    let status = e.status().map(|s| s.as_u16());
    let message = if e.is_timeout() {
        format!("request timed out: {}", e.without_url())
    } else if e.is_connect() {
        format!("connection failed: {}", e.without_url())
    } else {
        e.without_url().to_string()
    };
    FetchError::transport(status, message)
}

/// Turn a non-success response into a transport error carrying the body text.
pub(crate) fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(FetchError::transport(Some(status.as_u16()), message))
}

pub(crate) fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    let status = response.status().as_u16();
    response
        .json::<T>()
        .map_err(|e| FetchError::transport(Some(status), format!("malformed response: {}", e.without_url())))
}

pub(crate) fn read_text(response: Response) -> Result<String, FetchError> {
    let status = response.status().as_u16();
    response
        .text()
        .map_err(|e| FetchError::transport(Some(status), format!("unreadable response: {}", e.without_url())))
}

/// Lenient numeric read: providers send numbers, numeric strings, or null.
pub(crate) fn value_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}
