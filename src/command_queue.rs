//! Serialized request pipeline for short-lived calls to the TV.
//!
//! The TV's embedded HTTP server copes badly with overlapping requests, so every short call for a
//! device goes through one [`CommandQueue`]. A single worker task executes queued requests
//! strictly in FIFO order, one at a time, and waits a minimum spacing interval after each one
//! (whatever its outcome) before starting the next.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use reqwest::Method;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::device_settings::Credentials;
use crate::errors::DeviceError;
use crate::http_transport::{HttpResponse, HttpTransport};
use crate::request_channel::RequestChannel;

const QUEUE_CAPACITY: usize = 32;

/// A request waiting for (or undergoing) execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `audio/volume`.
    pub path: String,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl PendingRequest {
    pub fn get(path: &str, timeout: Duration) -> Self {
        PendingRequest {
            method: Method::GET,
            path: path.into(),
            body: None,
            timeout,
        }
    }

    pub fn post(path: &str, body: String, timeout: Duration) -> Self {
        PendingRequest {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            timeout,
        }
    }
}

impl fmt::Display for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

struct QueueEntry {
    request: PendingRequest,
    reply_tx: oneshot::Sender<Result<HttpResponse, DeviceError>>,
}

/// FIFO, one-at-a-time request queue for a single TV.
///
/// Cloning a `CommandQueue` produces another handle onto the same queue. The worker task stops
/// once every handle has been dropped.
#[derive(Clone)]
pub struct CommandQueue {
    queue_tx: mpsc::Sender<QueueEntry>,
}

impl CommandQueue {
    /// Start the queue's worker task. Must be called from within a Tokio runtime.
    pub fn start(
        transport: Arc<dyn HttpTransport>,
        credentials: Option<Credentials>,
        base_url: Url,
        spacing: Duration,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let channel = RequestChannel::new(transport, credentials);

        tokio::spawn(CommandQueue::process(channel, base_url, spacing, queue_rx));

        CommandQueue { queue_tx }
    }

    /// Queue a request and wait for its result.
    ///
    /// Failures of any kind resolve to `None`; the queue never propagates an error.
    pub async fn enqueue(&self, request: PendingRequest) -> Option<HttpResponse> {
        self.try_enqueue(request).await.ok()
    }

    /// Queue a request and wait for its result, keeping the failure details.
    pub async fn try_enqueue(&self, request: PendingRequest) -> Result<HttpResponse, DeviceError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.queue_tx
            .send(QueueEntry { request, reply_tx })
            .await
            .map_err(|_| DeviceError::Transport(String::from("Command queue has shut down")))?;

        reply_rx.await.unwrap_or_else(|_| {
            Err(DeviceError::Transport(String::from(
                "Command queue dropped the request",
            )))
        })
    }

    async fn process(
        mut channel: RequestChannel,
        base_url: Url,
        spacing: Duration,
        mut queue_rx: mpsc::Receiver<QueueEntry>,
    ) {
        debug!("Command queue started for {}", &base_url);

        while let Some(QueueEntry { request, reply_tx }) = queue_rx.recv().await {
            let result = match base_url.join(&request.path) {
                Ok(url) => {
                    channel
                        .execute(
                            request.method.clone(),
                            &url,
                            request.body.as_deref(),
                            request.timeout,
                        )
                        .await
                }
                Err(e) => {
                    error!("Invalid request path '{}': {}", &request.path, e);
                    Err(DeviceError::Transport(format!("Invalid request path: {e}")))
                }
            };

            match &result {
                Ok(_) => debug!("{} completed", &request),
                Err(e) if e.is_transport() => debug!("{} failed: {}", &request, e),
                Err(e) => warn!("{} failed: {}", &request, e),
            }

            // The caller may have stopped waiting; the result is simply discarded.
            let _ = reply_tx.send(result);

            tokio::time::sleep(spacing).await;
        }

        debug!("Command queue shut down for {}", &base_url);
    }
}

// ================================================================================================
// Tests
