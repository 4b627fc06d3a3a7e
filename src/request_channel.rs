//! A single authenticated HTTP exchange with the TV.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use url::Url;

use crate::auth_cache::AuthCache;
use crate::device_settings::Credentials;
use crate::errors::DeviceError;
use crate::helpers::{digest_uri, error_message_from_body};
use crate::http_transport::{HttpRequest, HttpResponse, HttpTransport};

const UNAUTHORIZED: u16 = 401;

/// Executes requests against the TV, handling Digest authentication transparently.
///
/// In the common case a cached challenge is reused and the request completes in one round trip.
/// A 401 on a cached header means the nonce expired: the cache is dropped and a fresh
/// challenge round trip is made. Transport failures are never retried here.
pub struct RequestChannel {
    transport: Arc<dyn HttpTransport>,
    auth_cache: AuthCache,
}

impl RequestChannel {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Option<Credentials>) -> Self {
        RequestChannel {
            transport,
            auth_cache: AuthCache::new(credentials),
        }
    }

    /// Execute one request. Non-2xx responses are returned as [`DeviceError::Status`].
    pub async fn execute(
        &mut self,
        method: Method,
        url: &Url,
        body: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, DeviceError> {
        let uri = digest_uri(url);

        if let Some(authorization) = self.auth_cache.build_header(method.as_str(), &uri) {
            let response = self
                .send(&method, url, body, timeout, Some(authorization))
                .await?;

            if response.status != UNAUTHORIZED {
                return into_result(response);
            }

            debug!("Cached Digest nonce rejected for {}; re-authenticating", &uri);
            self.auth_cache.invalidate();
        }

        let response = self.send(&method, url, body, timeout, None).await?;

        if response.status != UNAUTHORIZED {
            return into_result(response);
        }

        let Some(challenge) = response.header("www-authenticate") else {
            return Err(DeviceError::Unauthorized(String::from(
                "TV returned 401 without an authentication challenge",
            )));
        };

        if !self.auth_cache.cache_from_challenge(challenge) {
            return Err(DeviceError::Unauthorized(String::from(
                "TV returned an unsupported authentication challenge",
            )));
        }

        let Some(authorization) = self.auth_cache.build_header(method.as_str(), &uri) else {
            return Err(DeviceError::Unauthorized(String::from(
                "Could not build Digest authorization",
            )));
        };

        let response = self
            .send(&method, url, body, timeout, Some(authorization))
            .await?;

        if response.status == UNAUTHORIZED {
            warn!("TV rejected Digest credentials for {}", &uri);
            self.auth_cache.invalidate();

            return Err(DeviceError::Unauthorized(String::from(
                "TV rejected the configured credentials",
            )));
        }

        into_result(response)
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&str>,
        timeout: Duration,
        authorization: Option<String>,
    ) -> Result<HttpResponse, DeviceError> {
        let request = HttpRequest {
            method: method.clone(),
            url: url.clone(),
            headers: authorization
                .map(|value| vec![(String::from("authorization"), value)])
                .unwrap_or_default(),
            body: body.map(String::from),
            timeout,
        };

        self.transport.send(request).await
    }
}

fn into_result(response: HttpResponse) -> Result<HttpResponse, DeviceError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(DeviceError::Status {
            status: response.status,
            message: error_message_from_body(response.status, &response.body),
        })
    }
}

// ================================================================================================
// Tests
