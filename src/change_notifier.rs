//! Long-poll change notifications from the TV.
//!
//! The TV exposes a `notifychange` endpoint which blocks until one of the subscribed resources
//! changes. [`ChangeNotifier`] keeps one such call in flight at all times while it is running and
//! forwards every reported change to the caller as a [`NotifierEvent::Notification`].
//!
//! Which transport serves the endpoint (HTTPS or plain HTTP) is device-dependent and undocumented,
//! so both are probed in order and the one that answers is remembered. A remembered transport
//! which fails is forgotten rather than blacklisted, since firmware can change what is reachable
//! across reboots.
//!
//! The notifier owns its own [`RequestChannel`] (and therefore its own Digest cache): a long-poll
//! call may block for its full timeout, and sharing the short-call queue would starve it.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::Method;
use rust_fsm::StateMachine;
use tokio::select;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::device_settings::{Credentials, DeviceSettings};
use crate::errors::DeviceError;
use crate::helpers::{backoff_delay, generate_api_base_url};
use crate::http_transport::HttpTransport;
use crate::jointspace_payloads::{notify_change_request, parse_notification, NotificationMap};
use crate::notifier_state_machine::{Input, NotifierState, NotifierStateMachine};
use crate::request_channel::RequestChannel;

const NOTIFY_CHANGE_PATH: &str = "notifychange";

// CHANNEL MESSAGES -------------------------------------------------------------------------------

/// Events sent from a running [`ChangeNotifier`] to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifierEvent {
    /// The TV reported changes to these resources. Every reported resource is forwarded,
    /// including ones that change constantly; filtering is up to the receiver.
    Notification(NotificationMap),
    /// The consecutive-failure ceiling was reached and the notifier has stopped. It will not
    /// poll again until restarted.
    Failed,
}

// ------------------------------------------------------------------------------------------------

/// The two candidate transports for the long-poll endpoint, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LongPollTransport {
    Https,
    Http,
}

impl fmt::Display for LongPollTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LongPollTransport::Https => write!(f, "HTTPS"),
            LongPollTransport::Http => write!(f, "HTTP"),
        }
    }
}

const PROBE_ORDER: [LongPollTransport; 2] = [LongPollTransport::Https, LongPollTransport::Http];

#[derive(Debug, Clone)]
struct NotifierConfig {
    https_url: Url,
    http_url: Url,
    timeout: Duration,
    min_spacing: Duration,
    failure_ceiling: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl NotifierConfig {
    fn from_settings(settings: &DeviceSettings) -> Result<Self, String> {
        let endpoint = |is_tls: bool, port: u16| {
            generate_api_base_url(&settings.host, is_tls, port, settings.api_version)?
                .join(NOTIFY_CHANGE_PATH)
                .map_err(|e| format!("Could not create long-poll URL: {e}"))
        };

        Ok(NotifierConfig {
            https_url: endpoint(true, settings.https_port)?,
            http_url: endpoint(false, settings.http_port)?,
            timeout: settings.long_poll_timeout,
            min_spacing: settings.long_poll_min_spacing,
            failure_ceiling: settings.long_poll_failure_ceiling.max(1),
            backoff_base: settings.long_poll_backoff_base,
            backoff_max: settings.long_poll_backoff_max,
        })
    }

    fn url_for(&self, transport: LongPollTransport) -> &Url {
        match transport {
            LongPollTransport::Https => &self.https_url,
            LongPollTransport::Http => &self.http_url,
        }
    }
}

/// Per-start long-poll state.
struct LongPollSession {
    working_transport: Option<LongPollTransport>,
    channel: RequestChannel,
    consecutive_failures: u32,
    backoff_delay: Duration,
}

impl LongPollSession {
    fn new(channel: RequestChannel, backoff_base: Duration) -> Self {
        LongPollSession {
            working_transport: None,
            channel,
            consecutive_failures: 0,
            backoff_delay: backoff_base,
        }
    }

    /// Issue one long-poll call, probing transports if none is known to work.
    async fn poll_once(&mut self, config: &NotifierConfig) -> Result<NotificationMap, DeviceError> {
        let candidates: Vec<LongPollTransport> = match self.working_transport {
            Some(transport) => vec![transport],
            None => PROBE_ORDER.to_vec(),
        };

        let body = notify_change_request().to_string();
        let mut last_error =
            DeviceError::Transport(String::from("No long-poll transport available"));

        for candidate in candidates {
            let result = self
                .channel
                .execute(
                    Method::POST,
                    config.url_for(candidate),
                    Some(&body),
                    config.timeout,
                )
                .await
                .and_then(|response| {
                    parse_notification(&response.body).map_err(DeviceError::InvalidResponse)
                });

            match result {
                Ok(resources) => {
                    if self.working_transport.is_none() {
                        info!("Long-poll transport detected: {}", candidate);
                    }

                    self.working_transport = Some(candidate);

                    return Ok(resources);
                }
                Err(e) => {
                    debug!("Long-poll over {} failed: {}", candidate, e);

                    if self.working_transport == Some(candidate) {
                        info!("Forgetting long-poll transport {}; will re-probe", candidate);
                        self.working_transport = None;
                    }

                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn record_success(&mut self, backoff_base: Duration) {
        self.consecutive_failures = 0;
        self.backoff_delay = backoff_base;
    }
}

// ================================================================================================
// ChangeNotifier

/// Long-poll client for one TV.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use philipstv_manager::{ChangeNotifier, DeviceSettingsBuilder, NotifierEvent, ReqwestTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let settings = DeviceSettingsBuilder::new("192.168.1.20")
///         .with_credentials("user", "secret")
///         .build();
///     let transport = Arc::new(ReqwestTransport::new().unwrap());
///
///     let mut notifier = ChangeNotifier::new(&settings, transport).unwrap();
///     let mut events = notifier.start();
///
///     while let Some(event) = events.recv().await {
///         match event {
///             NotifierEvent::Notification(resources) => println!("Changed: {:?}", resources.keys()),
///             NotifierEvent::Failed => break,
///         }
///     }
/// }
/// ```
pub struct ChangeNotifier {
    config: NotifierConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: Option<Credentials>,
    fsm: Arc<Mutex<StateMachine<NotifierStateMachine>>>,
    cancel_token: Option<CancellationToken>,
}

impl ChangeNotifier {
    pub fn new(settings: &DeviceSettings, transport: Arc<dyn HttpTransport>) -> Result<Self, String> {
        Ok(ChangeNotifier {
            config: NotifierConfig::from_settings(settings)?,
            transport,
            credentials: settings.credentials.clone(),
            fsm: Arc::new(Mutex::new(StateMachine::new())),
            cancel_token: None,
        })
    }

    /// Current notifier state.
    pub fn state(&self) -> NotifierState {
        self.fsm
            .lock()
            .map(|fsm| *fsm.state())
            .unwrap_or(NotifierState::Idle)
    }

    /// Start long-polling. Must be called from within a Tokio runtime.
    ///
    /// Each start begins a fresh session (no remembered transport, no cached Digest state). Any
    /// session already running is stopped first. Returns the receiver for this session's events;
    /// it closes when the session ends.
    pub fn start(&mut self) -> Receiver<NotifierEvent> {
        if self.cancel_token.is_some() {
            self.stop();
        }

        let (events_tx, events_rx) = channel(32);
        let cancel_token = CancellationToken::new();

        // Each session drives its own state machine, so a stopped session's task can't move the
        // new session's state.
        self.fsm = Arc::new(Mutex::new(StateMachine::new()));
        consume(&self.fsm, Input::Start);
        info!("Long-poll notifier starting");

        let session = LongPollSession::new(
            RequestChannel::new(self.transport.clone(), self.credentials.clone()),
            self.config.backoff_base,
        );

        tokio::spawn(ChangeNotifier::poll_loop(
            session,
            self.config.clone(),
            self.fsm.clone(),
            events_tx,
            cancel_token.clone(),
        ));
        self.cancel_token = Some(cancel_token);

        events_rx
    }

    /// Stop long-polling, aborting any in-flight call immediately.
    pub fn stop(&mut self) {
        if let Some(cancel_token) = self.cancel_token.take() {
            info!("Long-poll notifier stopping");
            cancel_token.cancel();
        }

        if self.state() != NotifierState::Idle {
            consume(&self.fsm, Input::Stop);
        }
    }

    /// Whether a session is running (polling or backing off).
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            NotifierState::Polling | NotifierState::BackingOff
        )
    }

    async fn poll_loop(
        mut session: LongPollSession,
        config: NotifierConfig,
        fsm: Arc<Mutex<StateMachine<NotifierStateMachine>>>,
        events_tx: Sender<NotifierEvent>,
        cancel_token: CancellationToken,
    ) {
        loop {
            let poll_started = Instant::now();

            let result = select! {
                result = session.poll_once(&config) => result,
                _ = cancel_token.cancelled() => break,
            };

            if cancel_token.is_cancelled() {
                break;
            }

            match result {
                Ok(resources) => {
                    session.record_success(config.backoff_base);
                    consume(&fsm, Input::PollSucceeded);

                    debug!("Long-poll notification: {:?}", resources.keys());

                    if !send_event(&events_tx, NotifierEvent::Notification(resources), &cancel_token)
                        .await
                    {
                        break;
                    }

                    // The TV sometimes answers immediately with stale data; don't spin on it.
                    let elapsed = poll_started.elapsed();

                    if elapsed < config.min_spacing {
                        select! {
                            _ = tokio::time::sleep(config.min_spacing - elapsed) => {},
                            _ = cancel_token.cancelled() => break,
                        }
                    }
                }
                Err(e) => {
                    session.consecutive_failures += 1;

                    if session.consecutive_failures >= config.failure_ceiling {
                        warn!(
                            "Long-poll failed {} consecutive times; giving up (last error: {})",
                            session.consecutive_failures, e
                        );

                        consume(&fsm, Input::FailureCeilingReached);
                        send_event(&events_tx, NotifierEvent::Failed, &cancel_token).await;

                        return;
                    }

                    session.backoff_delay = backoff_delay(
                        session.consecutive_failures,
                        config.backoff_base,
                        config.backoff_max,
                    );

                    debug!(
                        "Long-poll failure #{} ({}); retrying in {:?}",
                        session.consecutive_failures, e, session.backoff_delay
                    );

                    consume(&fsm, Input::PollFailed);

                    select! {
                        _ = tokio::time::sleep(session.backoff_delay) => {},
                        _ = cancel_token.cancelled() => break,
                    }

                    consume(&fsm, Input::BackoffElapsed);
                }
            }
        }

        // Covers every exit other than giving up: stop(), or the owner dropping the receiver
        consume(&fsm, Input::Stop);

        debug!("Long-poll session ended");
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        if let Some(cancel_token) = self.cancel_token.take() {
            cancel_token.cancel();
        }
    }
}

/// Feed an `Input` to the notifier state machine.
fn consume(fsm: &Mutex<StateMachine<NotifierStateMachine>>, input: Input) {
    match fsm.lock() {
        Ok(mut fsm) => {
            let entry_state = *fsm.state();

            match fsm.consume(&input) {
                Ok(output) => debug!(
                    "Notifier FSM acting on input [{:?}]: {:?} -> {:?}, with output [{:?}]",
                    &input,
                    entry_state,
                    fsm.state(),
                    output
                ),
                // Expected when a stop races with the session's own progress
                Err(_) => debug!(
                    "Notifier FSM ignored input [{:?}] while in state {:?}",
                    &input, entry_state
                ),
            }
        }
        Err(_) => error!("Notifier state machine lock poisoned"),
    }
}

/// Send an event to the notifier's owner. Returns `false` if the session should end.
async fn send_event(
    events_tx: &Sender<NotifierEvent>,
    event: NotifierEvent,
    cancel_token: &CancellationToken,
) -> bool {
    select! {
        result = events_tx.send(event) => match result {
            Ok(_) => true,
            Err(_) => {
                warn!("Long-poll event channel closed");
                false
            }
        },
        _ = cancel_token.cancelled() => false,
    }
}

// ================================================================================================
// Tests
