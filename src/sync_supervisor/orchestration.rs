use log::{debug, error, info, warn};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::change_notifier::ChangeNotifier;
use crate::jointspace_payloads::NotificationMap;
use crate::{LongPollStatus, SupervisorError, SupervisorOutputMessage, TvCommand};

use super::{PendingRetry, SyncSupervisor};

// ------------------------------------------------------------------------------------------------
// Orchestration between the Supervisor, the poll timers, and the ChangeNotifier
//
// These functions are invoked as a result of:
//
//  * A received `SupervisorMessage` from the caller.
//  * A timer elapsing (startup, interval tick, long-poll retry).
//  * A received `NotifierEvent` from the ChangeNotifier.
//  * A power transition seen by a poll.
// ------------------------------------------------------------------------------------------------

impl SyncSupervisor {
    /// Run the startup sequence: poll, announce readiness, then start polling.
    pub(crate) async fn startup(&mut self) {
        info!("Performing initial poll");

        self.full_poll().await;
        self.is_started = true;

        let _ = self
            .send_out(SupervisorOutputMessage::ReadyForDependentInit)
            .await;

        self.start_interval_polling().await;

        let is_on = self.snapshot_tx.borrow().is_on();

        if is_on {
            self.start_long_poll().await;
        }
    }

    /// Stop everything. Safe to call any number of times.
    pub(crate) async fn teardown(&mut self) {
        self.startup_at = None;
        self.stop_interval_polling().await;
        self.stop_long_poll().await;
        self.pending_retry = None;
    }

    // --------------------------------------------------------------------------------------------
    // Caller commands

    /// Act on a caller's `TvCommand`.
    ///
    /// Queries refresh the matching part of the snapshot. Other commands are sent to the TV; a
    /// failure is reported to the caller, and a success is followed by a full poll unless
    /// long-polling is confirmed (in which case the TV will announce the change itself).
    pub(crate) async fn send_tv_command(&mut self, command: TvCommand) {
        if command.is_query() {
            self.refresh_queried(&command).await;
            return;
        }

        info!("Sending command to TV: {}", &command);

        match self.device.send_command(command.clone()).await {
            Ok(_) => {
                if !self.is_long_poll_confirmed {
                    self.full_poll().await;
                }
            }
            Err(e) => {
                let msg = format!("{} failed: {}", &command, e);
                warn!("{}", &msg);

                let _ = self
                    .send_out(SupervisorOutputMessage::Error(SupervisorError::Command(msg)))
                    .await;
            }
        }
    }

    async fn refresh_queried(&mut self, query: &TvCommand) {
        match query {
            TvCommand::GetPowerState => {
                self.poll_power().await;
            }
            TvCommand::GetAmbilightConfiguration | TvCommand::GetAmbilightPower => {
                self.poll_ambilight().await;
            }
            TvCommand::GetVolume => self.poll_volume().await,
            TvCommand::GetCurrentActivity => self.poll_input().await,
            other => debug!("No snapshot refresh for {}", other),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Power transitions

    pub(crate) async fn handle_power_on(&mut self) {
        self.start_long_poll().await;
    }

    /// Long-polling is only meaningful while the TV is on, so it is stopped (without a retry) and
    /// interval polling takes over watching for the TV to wake.
    pub(crate) async fn handle_power_off(&mut self) {
        self.stop_long_poll().await;

        if self.pending_retry.take().is_some() {
            debug!("Cancelled pending long-poll retry");
        }

        self.start_interval_polling().await;
    }

    // --------------------------------------------------------------------------------------------
    // Interval polling

    pub(crate) async fn start_interval_polling(&mut self) {
        if self.interval.is_some() {
            return;
        }

        let period = self.settings.poll_interval;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.interval = Some(interval);
        info!("Interval polling started (every {:?})", period);

        let _ = self
            .send_out(SupervisorOutputMessage::IntervalPolling(true))
            .await;
    }

    pub(crate) async fn stop_interval_polling(&mut self) {
        if self.interval.take().is_some() {
            info!("Interval polling stopped");

            let _ = self
                .send_out(SupervisorOutputMessage::IntervalPolling(false))
                .await;
        }
    }

    // --------------------------------------------------------------------------------------------
    // Long-polling

    /// Start a long-poll session unless one is already running.
    ///
    /// A notifier which previously failed is restarted rather than replaced.
    pub(crate) async fn start_long_poll(&mut self) {
        if !self.settings.long_poll_enabled {
            return;
        }

        if self
            .notifier
            .as_ref()
            .is_some_and(|notifier| notifier.is_active())
        {
            debug!("Long-poll session already running");
            return;
        }

        let mut notifier = match self.notifier.take() {
            Some(notifier) => notifier,
            None => match ChangeNotifier::new(&self.settings, self.transport.clone()) {
                Ok(notifier) => notifier,
                Err(e) => {
                    let msg = format!("Could not create long-poll notifier: {e}");
                    error!("{}", &msg);

                    let _ = self
                        .send_out(SupervisorOutputMessage::Error(SupervisorError::Channel(msg)))
                        .await;

                    return;
                }
            },
        };

        self.notifier_rx = Some(notifier.start());
        self.notifier = Some(notifier);
        self.long_poll_sessions += 1;
        self.is_long_poll_confirmed = false;

        info!("Long-polling started (session {})", self.long_poll_sessions);

        let _ = self
            .send_out(SupervisorOutputMessage::LongPollStatus(
                LongPollStatus::Started,
            ))
            .await;
    }

    /// Stop and discard the long-poll session, if any.
    pub(crate) async fn stop_long_poll(&mut self) {
        self.notifier_rx = None;
        self.is_long_poll_confirmed = false;

        if let Some(mut notifier) = self.notifier.take() {
            notifier.stop();
            info!("Long-polling stopped");

            let _ = self
                .send_out(SupervisorOutputMessage::LongPollStatus(
                    LongPollStatus::Stopped,
                ))
                .await;
        }
    }

    /// Handle a change notification from the TV.
    ///
    /// The first notification containing anything other than noise resources confirms that
    /// long-polling works, which ends interval polling. Notifications don't carry enough detail
    /// to update the snapshot directly, so every notification triggers a full poll.
    pub(crate) async fn handle_notification(&mut self, resources: NotificationMap) {
        debug!(
            "Change notification for: {:?}",
            resources.keys().collect::<Vec<_>>()
        );

        let noise = &self.settings.noise_resources;
        let is_actionable = resources.keys().any(|resource| !noise.contains(resource));

        if is_actionable && !self.is_long_poll_confirmed {
            self.is_long_poll_confirmed = true;
            info!("Long-polling confirmed");

            let _ = self
                .send_out(SupervisorOutputMessage::LongPollStatus(
                    LongPollStatus::Confirmed,
                ))
                .await;

            self.stop_interval_polling().await;
        }

        self.full_poll().await;
    }

    /// Handle the long-poll session giving up. While the TV is on, interval polling takes over
    /// and long-polling is retried after the cooldown.
    pub(crate) async fn handle_long_poll_failed(&mut self) {
        warn!("Long-polling failed");

        self.is_long_poll_confirmed = false;

        let _ = self
            .send_out(SupervisorOutputMessage::LongPollStatus(
                LongPollStatus::Failed,
            ))
            .await;

        let is_on = self.snapshot_tx.borrow().is_on();

        if is_on {
            self.start_interval_polling().await;
            self.schedule_long_poll_retry().await;
        }
    }

    pub(crate) async fn schedule_long_poll_retry(&mut self) {
        let cooldown = self.settings.long_poll_retry_cooldown;

        self.pending_retry = Some(PendingRetry {
            at: Instant::now() + cooldown,
            session: self.long_poll_sessions,
        });

        info!("Long-polling will be retried in {:?}", cooldown);

        let _ = self
            .send_out(SupervisorOutputMessage::LongPollStatus(
                LongPollStatus::RetryScheduled,
            ))
            .await;
    }

    /// Act on an elapsed long-poll retry, unless it has been overtaken by events.
    pub(crate) async fn handle_long_poll_retry(&mut self) {
        let Some(retry) = self.pending_retry.take() else {
            return;
        };

        if retry.session != self.long_poll_sessions {
            debug!("Ignoring long-poll retry: a newer session has already started");
            return;
        }

        let is_on = self.snapshot_tx.borrow().is_on();

        if !is_on {
            debug!("Ignoring long-poll retry: TV is not on");
            return;
        }

        info!("Retrying long-polling");
        self.start_long_poll().await;
    }
}
