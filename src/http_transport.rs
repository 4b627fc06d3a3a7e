//! The single upstream capability the device layer depends on: issue one HTTP request.
//!
//! [`ReqwestTransport`] talks to a real TV. The TV serves a self-signed certificate, so the TLS
//! connector accepts invalid certificates and host names.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use url::Url;

use crate::errors::DeviceError;

/// One outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// A received HTTP response. Header names are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: &str) -> Self {
        HttpResponse {
            status,
            headers: vec![],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issue an HTTP request and return the TV's response.
///
/// Implementations report transport-level problems (timeouts, refused connections) as
/// [`DeviceError::Timeout`] / [`DeviceError::Transport`]; any status code the TV returns, including
/// errors, is an `Ok` response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DeviceError>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, DeviceError> {
        let tls_connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| DeviceError::Tls(format!("Could not create TLS connector: {e}")))?;

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls_connector)
            .no_proxy()
            .build()
            .map_err(|e| DeviceError::Tls(e.to_string()))?;

        Ok(ReqwestTransport { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DeviceError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DeviceError::Transport(format!("Invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DeviceError::Transport(format!("Invalid header value: {e}")))?;

            builder = builder.header(name, value);
        }

        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!("{} {} failed: {:?}", request.method, request.url, e);

            if e.is_timeout() {
                DeviceError::Timeout
            } else {
                DeviceError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                DeviceError::Timeout
            } else {
                DeviceError::Transport(format!("Could not read response body: {e}"))
            }
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ================================================================================================
// Tests
