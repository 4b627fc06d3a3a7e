mod full_poll;
mod message_senders;
mod orchestration;
mod out_emitters;
mod setters;

use std::future;
use std::sync::Arc;

use log::info;
use tokio::select;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant, Interval};
use tokio_util::sync::CancellationToken;

use crate::change_notifier::{ChangeNotifier, NotifierEvent};
use crate::command_queue::CommandQueue;
use crate::device_handle::DeviceHandle;
use crate::device_settings::DeviceSettings;
use crate::helpers::generate_api_base_url;
use crate::http_transport::{HttpTransport, ReqwestTransport};
use crate::state::{AmbilightState, DeviceSnapshot, VolumeState};
use crate::tv_commands::TvCommand;

#[cfg(doc)]
use crate::SyncSupervisorBuilder;

// CHANNEL MESSAGES -------------------------------------------------------------------------------

/// Messages sent from the caller to the [`SyncSupervisor`].
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorMessage {
    /// Send the given [`TvCommand`] to the TV. Query commands refresh the matching part of the
    /// snapshot.
    SendTvCommand(TvCommand),
    /// Perform one full poll of the TV now.
    RefreshState,
    /// Request sending of the current snapshot and poll mode as `SupervisorOutputMessage`s.
    EmitAllState,
    /// Shut down the [`SyncSupervisor`]. Stops all polling and ends [`SyncSupervisor::run()`].
    ShutDown,
}

/// Messages sent from the [`SyncSupervisor`] back to the caller.
///
/// Resource updates are only sent when the value differs from the last-known value.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutputMessage {
    /// The TV was turned on (`true`) or entered standby (`false`).
    PowerChanged(bool),
    /// The Ambilight state changed.
    AmbilightUpdated(AmbilightState),
    /// The volume level or mute state changed.
    VolumeUpdated(VolumeState),
    /// The foreground app changed (Android package name).
    InputUpdated(String),
    /// The initial poll has completed; anything depending on known TV state can be set up.
    ReadyForDependentInit,
    /// The long-poll mode changed.
    LongPollStatus(LongPollStatus),
    /// Interval polling started (`true`) or stopped (`false`).
    IntervalPolling(bool),
    /// The full last-known TV state. Sent in response to [`SupervisorMessage::EmitAllState`].
    Snapshot(DeviceSnapshot),
    /// A [`SyncSupervisor`] error occurred.
    Error(SupervisorError),
}

// ================================================================================================
// Additional structs

/// Errors sent from the [`SyncSupervisor`] back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SupervisorError {
    /// A caller-issued [`TvCommand`] failed.
    Command(String),
    /// Long-polling could not be set up.
    Channel(String),
}

/// Long-poll mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongPollStatus {
    /// A long-poll session is running alongside interval polling.
    Started,
    /// The TV sent a meaningful change notification. Interval polling is no longer needed.
    Confirmed,
    /// Long-polling was stopped (the TV entered standby, or the supervisor is shutting down).
    Stopped,
    /// Long-polling gave up after too many consecutive failures.
    Failed,
    /// Long-polling will be retried after the retry cooldown.
    RetryScheduled,
}

/// A long-poll restart waiting for its cooldown to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingRetry {
    pub at: Instant,
    /// Long-poll session count when the retry was scheduled. A retry is only acted on if no newer
    /// session has been started since.
    pub session: u64,
}

// ================================================================================================
// SyncSupervisor
//
// Design notes:
//
//  - The supervisor owns all TV state and is the only writer of the snapshot.
//  - All input from the caller is received over a receiver channel, and all output to the caller
//    is sent over a sender channel.
//  - Short calls (polls and commands) all go through one CommandQueue. The ChangeNotifier runs
//    its own long-poll session in a separate task with its own Digest state.
//  - Interval polling is the baseline. Long-polling runs alongside it while the TV is on, and
//    replaces it once the TV has sent a notification for something other than a noise resource.
//  - Long-polling is only meaningful while the TV is on: it is stopped on standby and started on
//    wake.
//  - Timers (startup, interval, long-poll retry) are plain deadlines in the run loop so that
//    cancelling one is just clearing it.
// ================================================================================================

/// Keep a Philips TV's state in sync, and control it.
///
/// Like the rest of the crate, the supervisor is driven by messages: [`SupervisorMessage`]s in,
/// [`SupervisorOutputMessage`]s out. Use [`SupervisorMessage::SendTvCommand`] (or a
/// [`DeviceHandle`]) to control the TV, and process the output messages to track its state.
///
/// ```no_run
/// use philipstv_manager::{DeviceSettingsBuilder, SyncSupervisorBuilder};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let settings = DeviceSettingsBuilder::new("192.168.1.20")
///         .with_credentials("user", "secret")
///         .build();
///
///     let (to_supervisor, to_supervisor_rx) = mpsc::channel(32);
///     let (mut supervisor, mut from_supervisor) =
///         SyncSupervisorBuilder::new(settings, to_supervisor_rx)
///             .build()
///             .unwrap();
///
///     // Start a task to receive `SupervisorOutputMessage` messages on `from_supervisor`
///     // Start a task to send `SupervisorMessage` messages on `to_supervisor`
///
///     supervisor.run().await;
/// }
/// ```
pub struct SyncSupervisor {
    settings: DeviceSettings,
    transport: Arc<dyn HttpTransport>,

    // TV access and state
    device: DeviceHandle,
    snapshot_tx: watch::Sender<DeviceSnapshot>, // Only the poll path writes the snapshot

    // Poll mode
    startup_at: Option<Instant>, // Cleared once the startup sequence has run (or on teardown)
    is_started: bool,
    interval: Option<Interval>, // Interval polling is active while this is set
    notifier: Option<ChangeNotifier>,
    notifier_rx: Option<Receiver<NotifierEvent>>,
    long_poll_sessions: u64,
    is_long_poll_confirmed: bool,
    pending_retry: Option<PendingRetry>,

    // Supervisor in/out channels
    command_rx: Receiver<SupervisorMessage>, // Receives SupervisorMessage from the caller
    output_tx: Sender<SupervisorOutputMessage>, // Sends SupervisorOutputMessage back to the caller

    cancel_token: CancellationToken,
}

impl SyncSupervisor {
    /// Creates a `SyncSupervisor` for the TV described by `settings`, talking to it with the
    /// default [`ReqwestTransport`]. Must be called from within a Tokio runtime.
    ///
    /// Expects to be given a tokio mpsc `Receiver` of [`SupervisorMessage`]s from the caller.
    /// Returns a tuple of itself and a `Receiver` of [`SupervisorOutputMessage`]s back to the
    /// caller.
    ///
    /// Use [`SyncSupervisorBuilder`] to provide a different [`HttpTransport`].
    pub fn new(
        settings: DeviceSettings,
        command_rx: Receiver<SupervisorMessage>,
    ) -> Result<(SyncSupervisor, Receiver<SupervisorOutputMessage>), String> {
        let transport = ReqwestTransport::new().map_err(|e| e.to_string())?;

        SyncSupervisor::with_transport(settings, command_rx, Arc::new(transport))
    }

    pub(crate) fn with_transport(
        settings: DeviceSettings,
        command_rx: Receiver<SupervisorMessage>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<(SyncSupervisor, Receiver<SupervisorOutputMessage>), String> {
        settings.validate()?;

        let base_url = generate_api_base_url(
            &settings.host,
            settings.is_tls,
            if settings.is_tls {
                settings.https_port
            } else {
                settings.http_port
            },
            settings.api_version,
        )?;

        let command_queue = CommandQueue::start(
            transport.clone(),
            settings.credentials.clone(),
            base_url,
            settings.request_spacing,
        );

        let (snapshot_tx, snapshot_rx) = watch::channel(DeviceSnapshot::default());
        let (output_tx, output_rx) = channel(32);

        let supervisor = SyncSupervisor {
            device: DeviceHandle::new(command_queue, snapshot_rx, settings.request_timeout),
            settings,
            transport,
            snapshot_tx,
            startup_at: None,
            is_started: false,
            interval: None,
            notifier: None,
            notifier_rx: None,
            long_poll_sessions: 0,
            is_long_poll_confirmed: false,
            pending_retry: None,
            command_rx,
            output_tx,
            cancel_token: CancellationToken::new(),
        };

        Ok((supervisor, output_rx))
    }

    /// A [`DeviceHandle`] for typed access to the TV. Handles share the supervisor's request
    /// queue and snapshot.
    pub fn device_handle(&self) -> DeviceHandle {
        self.device.clone()
    }

    /// A token which stops a running supervisor when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the supervisor. [`run()`](Self::run) tears down and returns.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Run the supervisor.
    ///
    /// Waits out the startup delay, performs the startup sequence (one full poll, then
    /// [`SupervisorOutputMessage::ReadyForDependentInit`], then interval polling, then
    /// long-polling if the TV is on), and then loops until told to shut down:
    ///
    /// * Accepting (and acting on) `SupervisorMessage` messages from the caller.
    /// * Polling the TV at the poll interval while interval polling is active.
    /// * Handling change notifications and failures from the long-poll session.
    /// * Retrying long-polling after a failure, once the retry cooldown has elapsed.
    ///
    /// Ends on [`SupervisorMessage::ShutDown`], when the caller's sender is dropped, or when
    /// [`stop()`](Self::stop) is called. All polling is stopped before returning.
    ///
    /// Messages and cancellation are handled between steps: a poll that is already underway
    /// (up to one request timeout per resource against an unreachable TV) completes first.
    pub async fn run(&mut self) {
        info!("Supervisor starting up for {}", &self.settings.host);

        if !self.is_started {
            self.startup_at = Some(Instant::now() + self.settings.startup_delay);
        }

        let cancel_token = self.cancel_token.clone();

        loop {
            select! {
                // FROM THE CALLER ----------------------------------------------------------------

                message = self.command_rx.recv() => {
                    match message {
                        Some(SupervisorMessage::SendTvCommand(command)) => {
                            self.send_tv_command(command).await;
                        }
                        Some(SupervisorMessage::RefreshState) => {
                            self.full_poll().await;
                        }
                        Some(SupervisorMessage::EmitAllState) => {
                            self.emit_all_state().await;
                        }
                        Some(SupervisorMessage::ShutDown) => {
                            info!("Supervisor shutting down");
                            break;
                        }
                        None => {
                            info!("Command channel closed; supervisor shutting down");
                            break;
                        }
                    }
                }

                // TIMERS -------------------------------------------------------------------------

                _ = sleep_until_deadline(self.startup_at) => {
                    self.startup_at = None;
                    self.startup().await;
                }

                _ = tick(&mut self.interval) => {
                    self.full_poll().await;
                }

                _ = sleep_until_deadline(self.pending_retry.map(|retry| retry.at)) => {
                    self.handle_long_poll_retry().await;
                }

                // FROM THE CHANGE NOTIFIER -------------------------------------------------------

                event = next_notifier_event(&mut self.notifier_rx) => {
                    match event {
                        Some(NotifierEvent::Notification(resources)) => {
                            self.handle_notification(resources).await;
                        }
                        Some(NotifierEvent::Failed) => {
                            self.handle_long_poll_failed().await;
                        }
                        // The session has ended
                        None => self.notifier_rx = None,
                    }
                }

                _ = cancel_token.cancelled() => {
                    info!("Supervisor stopped");
                    break;
                }
            }
        }

        self.teardown().await;

        info!("Supervisor shut down");
    }
}

// ------------------------------------------------------------------------------------------------
// Optional run-loop sources. Each never resolves when its source is absent.

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn next_notifier_event(
    notifier_rx: &mut Option<Receiver<NotifierEvent>>,
) -> Option<NotifierEvent> {
    match notifier_rx {
        Some(notifier_rx) => notifier_rx.recv().await,
        None => future::pending().await,
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc::{self, Sender};
    use tokio::task::JoinHandle;

    use super::{
        LongPollStatus, SupervisorError, SupervisorMessage, SupervisorOutputMessage,
        SyncSupervisor,
    };
    use crate::device_settings::{DeviceSettings, DeviceSettingsBuilder};
    use crate::errors::DeviceError;
    use crate::http_transport::{HttpRequest, HttpResponse};
    use crate::state::{AmbilightState, VolumeState};
    use crate::test_support::{ok_json, FakeReply, FakeTransport};
    use crate::tv_commands::TvCommand;

    type Outputs = Arc<Mutex<Vec<SupervisorOutputMessage>>>;

    const SHORT_CALL_PATHS: [&str; 4] = [
        "powerstate",
        "ambilight/currentconfiguration",
        "audio/volume",
        "activities/current",
    ];

    /// A fake TV whose power state can be flipped, with a scripted long-poll endpoint.
    fn fake_tv(
        is_on: Arc<AtomicBool>,
        long_poll: impl Fn(usize) -> FakeReply + Send + Sync + 'static,
    ) -> Arc<FakeTransport> {
        let long_poll_calls = AtomicUsize::new(0);

        FakeTransport::new(move |request: &HttpRequest| {
            match request.url.path().trim_start_matches("/6/") {
                "powerstate" => {
                    if is_on.load(Ordering::SeqCst) {
                        ok_json(r#"{"powerstate":"On"}"#)
                    } else {
                        ok_json(r#"{"powerstate":"Standby"}"#)
                    }
                }
                "ambilight/currentconfiguration" => {
                    ok_json(r#"{"styleName":"FOLLOW_VIDEO","isExpert":false,"menuSetting":"NATURAL"}"#)
                }
                "audio/volume" => ok_json(r#"{"muted":false,"current":15,"min":0,"max":60}"#),
                "activities/current" => ok_json(
                    r#"{"component":{"packageName":"org.droidtv.playtv","className":"Main"}}"#,
                ),
                "notifychange" => long_poll(long_poll_calls.fetch_add(1, Ordering::SeqCst)),
                _ => FakeReply::Respond(HttpResponse::new(404, "")),
            }
        })
    }

    fn settings() -> DeviceSettings {
        DeviceSettingsBuilder::new("10.0.0.101").build()
    }

    fn start(
        transport: Arc<FakeTransport>,
        settings: DeviceSettings,
    ) -> (Outputs, Sender<SupervisorMessage>, JoinHandle<()>) {
        let (to_supervisor, to_supervisor_rx) = mpsc::channel(32);
        let (mut supervisor, mut from_supervisor) =
            SyncSupervisor::with_transport(settings, to_supervisor_rx, transport).unwrap();

        let outputs: Outputs = Arc::new(Mutex::new(vec![]));
        let outputs_clone = outputs.clone();

        tokio::spawn(async move {
            while let Some(message) = from_supervisor.recv().await {
                outputs_clone.lock().unwrap().push(message);
            }
        });

        let run_handle = tokio::spawn(async move { supervisor.run().await });

        (outputs, to_supervisor, run_handle)
    }

    fn short_calls(transport: &FakeTransport) -> usize {
        SHORT_CALL_PATHS
            .iter()
            .map(|path| transport.count_path(path))
            .sum()
    }

    fn count(outputs: &Outputs, message: &SupervisorOutputMessage) -> usize {
        outputs
            .lock()
            .unwrap()
            .iter()
            .filter(|output| *output == message)
            .count()
    }

    /// Sleep until the given number of seconds after the test started.
    async fn advance_to(start: tokio::time::Instant, secs: u64) {
        tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn startup_sequence_with_tv_on() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(transport.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            *outputs.lock().unwrap(),
            vec![
                SupervisorOutputMessage::PowerChanged(true),
                SupervisorOutputMessage::AmbilightUpdated(AmbilightState {
                    is_on: true,
                    style: Some("FOLLOW_VIDEO".into()),
                    is_fallback: false,
                }),
                SupervisorOutputMessage::VolumeUpdated(VolumeState {
                    is_muted: false,
                    level: 15,
                    max_level: 60,
                }),
                SupervisorOutputMessage::InputUpdated("org.droidtv.playtv".into()),
                SupervisorOutputMessage::ReadyForDependentInit,
                SupervisorOutputMessage::IntervalPolling(true),
                SupervisorOutputMessage::LongPollStatus(LongPollStatus::Started),
            ]
        );
        assert_eq!(transport.count_path("notifychange"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_state_is_not_re_emitted() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(60)).await;

        // Several interval polls have run, but each value was only announced once
        assert!(transport.count_path("powerstate") >= 5);
        assert_eq!(outputs.lock().unwrap().len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn tv_off_never_reports_resources_or_long_polls() {
        let is_on = Arc::new(AtomicBool::new(false));
        let transport = fake_tv(is_on, |_| ok_json(r#"{"activities/current":{}}"#));
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(120)).await;

        for output in outputs.lock().unwrap().iter() {
            assert!(
                !matches!(
                    output,
                    SupervisorOutputMessage::AmbilightUpdated(_)
                        | SupervisorOutputMessage::VolumeUpdated(_)
                        | SupervisorOutputMessage::InputUpdated(_)
                        | SupervisorOutputMessage::LongPollStatus(_)
                ),
                "Unexpected output while off: {:?}",
                output
            );
        }

        assert_eq!(count(&outputs, &SupervisorOutputMessage::PowerChanged(false)), 1);
        assert_eq!(count(&outputs, &SupervisorOutputMessage::ReadyForDependentInit), 1);
        assert_eq!(transport.count_path("notifychange"), 0);
        assert_eq!(transport.count_path("audio/volume"), 0);
        assert!(transport.count_path("powerstate") > 5);
    }

    #[tokio::test(start_paused = true)]
    async fn actionable_notification_stops_interval_polling() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |call| match call {
            0 => ok_json(r#"{"context":{}}"#),
            1 => ok_json(r#"{"activities/current":{}}"#),
            _ => FakeReply::Hang,
        });
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(10)).await;

        // Startup poll, a poll for the noise notification, and one for the actionable one
        assert_eq!(short_calls(&transport), 12);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Confirmed)
            ),
            1
        );
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(false)), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(short_calls(&transport), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn noise_notifications_do_not_confirm() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |call| match call {
            0..=2 => ok_json(r#"{"context":{}}"#),
            _ => FakeReply::Hang,
        });
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(40)).await;

        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Confirmed)
            ),
            0
        );
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(false)), 0);

        // Interval polls keep running alongside the long-poll session
        let before = transport.count_path("powerstate");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.count_path("powerstate"), before + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn power_cycle_before_confirmation_schedules_no_retry() {
        let test_start = tokio::time::Instant::now();
        let is_on = Arc::new(AtomicBool::new(false));
        let transport = fake_tv(is_on.clone(), |_| FakeReply::Hang);
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        // Startup at 5s finds the TV off; interval polls at 15s, 25s, ...
        advance_to(test_start, 6).await;
        assert_eq!(transport.count_path("notifychange"), 0);

        is_on.store(true, Ordering::SeqCst);
        advance_to(test_start, 20).await;

        assert_eq!(count(&outputs, &SupervisorOutputMessage::PowerChanged(true)), 1);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Started)
            ),
            1
        );
        assert_eq!(transport.count_path("notifychange"), 1);

        is_on.store(false, Ordering::SeqCst);
        advance_to(test_start, 30).await;

        assert_eq!(count(&outputs, &SupervisorOutputMessage::PowerChanged(false)), 2);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Stopped)
            ),
            1
        );

        // Well past the retry cooldown
        advance_to(test_start, 300).await;

        assert_eq!(transport.count_path("notifychange"), 1);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::RetryScheduled)
            ),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn power_cycle_after_confirmation_restores_interval_polling() {
        let test_start = tokio::time::Instant::now();
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on.clone(), |call| match call {
            0 => ok_json(r#"{"activities/current":{}}"#),
            1 => FakeReply::Delayed(
                Duration::from_secs(10),
                HttpResponse::new(200, r#"{"powerstate":{"powerstate":"Standby"}}"#),
            ),
            _ => FakeReply::Hang,
        });
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        // Confirmed at startup (5s); the second notification arrives at about 16s
        advance_to(test_start, 10).await;
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(false)), 1);

        is_on.store(false, Ordering::SeqCst);
        advance_to(test_start, 20).await;

        // Standby seen by the notification's poll; interval polling takes over again
        let long_polls_before_wake = transport.count_path("notifychange");
        is_on.store(true, Ordering::SeqCst);
        advance_to(test_start, 30).await;

        let outputs = outputs.lock().unwrap();
        assert_eq!(
            outputs[7..],
            [
                SupervisorOutputMessage::LongPollStatus(LongPollStatus::Confirmed),
                SupervisorOutputMessage::IntervalPolling(false),
                SupervisorOutputMessage::PowerChanged(false),
                SupervisorOutputMessage::LongPollStatus(LongPollStatus::Stopped),
                SupervisorOutputMessage::IntervalPolling(true),
                SupervisorOutputMessage::PowerChanged(true),
                SupervisorOutputMessage::LongPollStatus(LongPollStatus::Started),
            ]
        );
        assert_eq!(
            transport.count_path("notifychange"),
            long_polls_before_wake + 1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_failure_falls_back_and_retries() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| {
            FakeReply::Fail(DeviceError::Transport("connection refused".into()))
        });
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings());

        // Five failed cycles take 2 + 4 + 8 + 16 seconds after the 5s startup
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert_eq!(transport.count_path("notifychange"), 10);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Failed)
            ),
            1
        );
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::RetryScheduled)
            ),
            1
        );

        // Interval polling never stopped
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(false)), 0);

        // The retry fires once the 60s cooldown has elapsed
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(transport.count_path("notifychange") > 10);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Started)
            ),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_retry_is_ignored() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (_to_supervisor, to_supervisor_rx) = mpsc::channel(32);
        let (mut supervisor, _from_supervisor) =
            SyncSupervisor::with_transport(settings(), to_supervisor_rx, transport.clone())
                .unwrap();

        supervisor.set_power(true).await;
        supervisor.schedule_long_poll_retry().await;

        // A newer session starts before the retry fires
        supervisor.start_long_poll().await;
        supervisor.handle_long_poll_retry().await;

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(supervisor.long_poll_sessions, 1);
        assert!(supervisor.pending_retry.is_none());
        assert_eq!(transport.count_path("notifychange"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_can_be_disabled() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let settings = DeviceSettingsBuilder::new("10.0.0.101")
            .with_no_long_poll()
            .build();
        let (outputs, _to_supervisor, _run) = start(transport.clone(), settings);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.count_path("notifychange"), 0);
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(true)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_messages() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (outputs, to_supervisor, run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let powerstate_calls = transport.count_path("powerstate");

        to_supervisor
            .send(SupervisorMessage::RefreshState)
            .await
            .unwrap();
        to_supervisor
            .send(SupervisorMessage::SendTvCommand(TvCommand::SendKey(
                "Unsupported".into(),
            )))
            .await
            .unwrap();
        to_supervisor
            .send(SupervisorMessage::EmitAllState)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(transport.count_path("powerstate"), powerstate_calls + 1);
        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::Error(SupervisorError::Command(
                    "SendKey(Unsupported) failed: status 404".into()
                ))
            ),
            1
        );

        {
            let outputs = outputs.lock().unwrap();
            let snapshot = outputs.iter().find_map(|output| match output {
                SupervisorOutputMessage::Snapshot(snapshot) => Some(snapshot.clone()),
                _ => None,
            });

            let snapshot = snapshot.unwrap();
            assert_eq!(snapshot.is_powered_on, Some(true));
            assert_eq!(snapshot.active_input.as_deref(), Some("org.droidtv.playtv"));
        }

        to_supervisor
            .send(SupervisorMessage::ShutDown)
            .await
            .unwrap();
        run.await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            count(
                &outputs,
                &SupervisorOutputMessage::LongPollStatus(LongPollStatus::Stopped)
            ),
            1
        );
        assert_eq!(count(&outputs, &SupervisorOutputMessage::IntervalPolling(false)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn query_commands_refresh_only_their_resource() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (outputs, to_supervisor, _run) = start(transport.clone(), settings());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let volume_calls = transport.count_path("audio/volume");
        let powerstate_calls = transport.count_path("powerstate");

        to_supervisor
            .send(SupervisorMessage::SendTvCommand(TvCommand::GetVolume))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.count_path("audio/volume"), volume_calls + 1);
        assert_eq!(transport.count_path("powerstate"), powerstate_calls);
        assert!(!outputs
            .lock()
            .unwrap()
            .iter()
            .any(|output| matches!(output, SupervisorOutputMessage::Error(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_startup() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (_to_supervisor, to_supervisor_rx) = mpsc::channel(32);
        let (mut supervisor, _from_supervisor) =
            SyncSupervisor::with_transport(settings(), to_supervisor_rx, transport.clone())
                .unwrap();

        let shutdown_token = supervisor.shutdown_token();
        let run = tokio::spawn(async move { supervisor.run().await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_token.cancel();
        run.await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_idempotent() {
        let is_on = Arc::new(AtomicBool::new(true));
        let transport = fake_tv(is_on, |_| FakeReply::Hang);
        let (_to_supervisor, to_supervisor_rx) = mpsc::channel(32);
        let (mut supervisor, mut from_supervisor) =
            SyncSupervisor::with_transport(settings(), to_supervisor_rx, transport.clone())
                .unwrap();

        supervisor.startup().await;
        supervisor.teardown().await;
        supervisor.teardown().await;

        let mut stopped = 0;
        while let Ok(message) = from_supervisor.try_recv() {
            if message == SupervisorOutputMessage::LongPollStatus(LongPollStatus::Stopped) {
                stopped += 1;
            }
        }

        assert_eq!(stopped, 1);
        assert!(supervisor.notifier.is_none());
        assert!(supervisor.interval.is_none());
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let transport = FakeTransport::new(|_| FakeReply::Hang);
        let (_to_supervisor, to_supervisor_rx) = mpsc::channel(32);

        let result = SyncSupervisor::with_transport(
            DeviceSettingsBuilder::new("").build(),
            to_supervisor_rx,
            transport,
        );

        assert!(result.is_err());
    }
}
