//! Typed, best-effort access to a TV's state.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::command_queue::CommandQueue;
use crate::errors::DeviceError;
use crate::jointspace_payloads::{
    AmbilightConfigurationPayload, AmbilightPowerPayload, CurrentActivityPayload,
    PowerStatePayload, VolumePayload,
};
use crate::state::{AmbilightState, DeviceSnapshot, VolumeState};
use crate::tv_commands::TvCommand;

/// A cloneable handle for querying and commanding one TV.
///
/// Every request goes through the device's shared [`CommandQueue`], so a handle can be used
/// freely alongside a running [`SyncSupervisor`](crate::SyncSupervisor) without overlapping its
/// requests.
///
/// The resource accessors ([`power()`](Self::power), [`volume()`](Self::volume), etc) query the
/// TV live and fall back to the last-known value from the supervisor's snapshot when the query
/// fails. `None` means the value is unknown.
#[derive(Clone)]
pub struct DeviceHandle {
    command_queue: CommandQueue,
    snapshot_rx: watch::Receiver<DeviceSnapshot>,
    request_timeout: Duration,
}

impl DeviceHandle {
    pub(crate) fn new(
        command_queue: CommandQueue,
        snapshot_rx: watch::Receiver<DeviceSnapshot>,
        request_timeout: Duration,
    ) -> Self {
        DeviceHandle {
            command_queue,
            snapshot_rx,
            request_timeout,
        }
    }

    /// Whether the TV is on (`false` is standby).
    pub async fn power(&self) -> Option<bool> {
        self.query_power()
            .await
            .or_else(|| self.snapshot_rx.borrow().is_powered_on)
    }

    /// Volume level and mute state.
    pub async fn volume(&self) -> Option<VolumeState> {
        self.query_volume()
            .await
            .or_else(|| self.snapshot_rx.borrow().volume.clone())
    }

    /// Ambilight state.
    pub async fn ambilight(&self) -> Option<AmbilightState> {
        self.query_ambilight()
            .await
            .or_else(|| self.snapshot_rx.borrow().ambilight.clone())
    }

    /// Package name of the foreground app.
    pub async fn current_input(&self) -> Option<String> {
        self.query_input()
            .await
            .or_else(|| self.snapshot_rx.borrow().active_input.clone())
    }

    /// The supervisor's last-known state. Does not contact the TV.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Send a command to the TV, waiting for it to complete.
    pub async fn send_command(&self, command: TvCommand) -> Result<(), DeviceError> {
        let request = command.request(&self.snapshot_rx.borrow(), self.request_timeout);

        self.command_queue.try_enqueue(request).await.map(|_| ())
    }

    // --------------------------------------------------------------------------------------------
    // Live queries (no snapshot fallback)

    pub(crate) async fn query_power(&self) -> Option<bool> {
        self.query::<PowerStatePayload>(TvCommand::GetPowerState)
            .await
            .map(|payload| payload.is_on())
    }

    /// Query the full Ambilight configuration, falling back to the simpler power endpoint when
    /// the TV doesn't provide one.
    pub(crate) async fn query_ambilight(&self) -> Option<AmbilightState> {
        if let Some(config) = self
            .query::<AmbilightConfigurationPayload>(TvCommand::GetAmbilightConfiguration)
            .await
        {
            return Some(AmbilightState {
                is_on: config.is_on(),
                style: Some(config.style_name),
                is_fallback: false,
            });
        }

        self.query::<AmbilightPowerPayload>(TvCommand::GetAmbilightPower)
            .await
            .map(|payload| AmbilightState {
                is_on: payload.is_on(),
                style: None,
                is_fallback: true,
            })
    }

    pub(crate) async fn query_volume(&self) -> Option<VolumeState> {
        self.query::<VolumePayload>(TvCommand::GetVolume)
            .await
            .map(|payload| VolumeState {
                is_muted: payload.muted,
                level: payload.current,
                max_level: payload.max,
            })
    }

    pub(crate) async fn query_input(&self) -> Option<String> {
        self.query::<CurrentActivityPayload>(TvCommand::GetCurrentActivity)
            .await
            .and_then(|payload| payload.component)
            .map(|component| component.package_name)
    }

    async fn query<T: DeserializeOwned>(&self, command: TvCommand) -> Option<T> {
        let request = command.request(&self.snapshot_rx.borrow(), self.request_timeout);
        let response = self.command_queue.enqueue(request).await?;

        serde_json::from_str(&response.body)
            .map_err(|e| debug!("Could not parse {} response: {}", command, e))
            .ok()
    }
}

// ================================================================================================
// Tests
