//! Scripted in-memory [`HttpTransport`] for unit tests.

use std::future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::errors::DeviceError;
use crate::http_transport::{HttpRequest, HttpResponse, HttpTransport};

/// What the fake TV does with one request.
pub(crate) enum FakeReply {
    Respond(HttpResponse),
    Fail(DeviceError),
    /// Respond after the given (virtual) delay.
    Delayed(Duration, HttpResponse),
    /// Never respond; only completes by being dropped.
    Hang,
}

pub(crate) fn ok_json(body: &str) -> FakeReply {
    FakeReply::Respond(HttpResponse::new(200, body))
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub request: HttpRequest,
    pub started: Instant,
}

impl RecordedCall {
    pub fn authorization(&self) -> Option<&str> {
        self.request
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }
}

type Responder = dyn Fn(&HttpRequest) -> FakeReply + Send + Sync;

pub(crate) struct FakeTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(&HttpRequest) -> FakeReply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(FakeTransport {
            responder: Box::new(responder),
            calls: Mutex::new(vec![]),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of recorded calls whose URL path ends with `suffix`.
    pub fn count_path(&self, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.request.url.path().ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DeviceError> {
        let reply = (self.responder)(&request);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                request,
                started: Instant::now(),
            });
        }

        match reply {
            FakeReply::Respond(response) => Ok(response),
            FakeReply::Fail(error) => Err(error),
            FakeReply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            FakeReply::Hang => future::pending().await,
        }
    }
}
