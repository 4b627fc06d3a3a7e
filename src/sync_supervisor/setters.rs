use log::{debug, info};

use crate::state::{AmbilightState, VolumeState};
use crate::SupervisorOutputMessage;

use super::SyncSupervisor;

// ------------------------------------------------------------------------------------------------
// Snapshot setters. Each announces its value to the caller only when it changed.
// ------------------------------------------------------------------------------------------------

impl SyncSupervisor {
    /// Update the power state, announcing and acting on any transition.
    ///
    /// Power transitions drive the long-poll mode, but only once the startup sequence has run
    /// (startup makes its own decision based on the first poll).
    pub(crate) async fn set_power(&mut self, is_on: bool) {
        let was_on = self.snapshot_tx.borrow().is_powered_on;

        if was_on == Some(is_on) {
            return;
        }

        self.snapshot_tx
            .send_modify(|snapshot| snapshot.is_powered_on = Some(is_on));

        match was_on {
            Some(_) => info!(
                "TV power changed: {}",
                if is_on { "standby -> on" } else { "on -> standby" }
            ),
            None => info!("TV is {}", if is_on { "on" } else { "in standby" }),
        }

        let _ = self
            .send_out(SupervisorOutputMessage::PowerChanged(is_on))
            .await;

        if self.is_started {
            if is_on {
                self.handle_power_on().await;
            } else {
                self.handle_power_off().await;
            }
        }
    }

    pub(crate) async fn set_ambilight(&mut self, ambilight: AmbilightState) {
        let is_changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.ambilight.as_ref() == Some(&ambilight) {
                return false;
            }

            snapshot.ambilight = Some(ambilight.clone());
            true
        });

        if is_changed {
            debug!("Ambilight updated: {:?}", &ambilight);

            let _ = self
                .send_out(SupervisorOutputMessage::AmbilightUpdated(ambilight))
                .await;
        }
    }

    pub(crate) async fn set_volume(&mut self, volume: VolumeState) {
        let is_changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.volume.as_ref() == Some(&volume) {
                return false;
            }

            snapshot.volume = Some(volume.clone());
            true
        });

        if is_changed {
            debug!("Volume updated: {:?}", &volume);

            let _ = self
                .send_out(SupervisorOutputMessage::VolumeUpdated(volume))
                .await;
        }
    }

    pub(crate) async fn set_input(&mut self, package: String) {
        let is_changed = self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.active_input.as_ref() == Some(&package) {
                return false;
            }

            snapshot.active_input = Some(package.clone());
            true
        });

        if is_changed {
            debug!("Input updated: {}", &package);

            let _ = self
                .send_out(SupervisorOutputMessage::InputUpdated(package))
                .await;
        }
    }
}
