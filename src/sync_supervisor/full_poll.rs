use log::debug;

use super::SyncSupervisor;

// ------------------------------------------------------------------------------------------------
// Polling the TV's state through the command queue.
//
// Poll results only reach the caller through the snapshot setters, so unchanged values are never
// re-announced.
// ------------------------------------------------------------------------------------------------

impl SyncSupervisor {
    /// Poll everything: power, then (only if the TV is on) Ambilight, volume, and input.
    pub(crate) async fn full_poll(&mut self) {
        match self.poll_power().await {
            Some(true) => {
                self.poll_ambilight().await;
                self.poll_volume().await;
                self.poll_input().await;
            }
            Some(false) => {}
            None => debug!("Power state unavailable; skipping remainder of poll"),
        }
    }

    pub(crate) async fn poll_power(&mut self) -> Option<bool> {
        let is_on = self.device.query_power().await?;
        self.set_power(is_on).await;

        Some(is_on)
    }

    pub(crate) async fn poll_ambilight(&mut self) {
        if let Some(ambilight) = self.device.query_ambilight().await {
            self.set_ambilight(ambilight).await;
        }
    }

    pub(crate) async fn poll_volume(&mut self) {
        if let Some(volume) = self.device.query_volume().await {
            self.set_volume(volume).await;
        }
    }

    pub(crate) async fn poll_input(&mut self) {
        if let Some(package) = self.device.query_input().await {
            self.set_input(package).await;
        }
    }
}
