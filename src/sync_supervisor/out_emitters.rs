use crate::notifier_state_machine::NotifierState;
use crate::{LongPollStatus, SupervisorOutputMessage};

use super::SyncSupervisor;

// ------------------------------------------------------------------------------------------------
// Emit various SupervisorOutputMessages to the caller.
// ------------------------------------------------------------------------------------------------

impl SyncSupervisor {
    /// Emit the snapshot and the current poll mode to the caller.
    pub(crate) async fn emit_all_state(&mut self) {
        self.emit_snapshot().await;
        self.emit_long_poll_status().await;
        self.emit_interval_polling().await;
    }

    /// Send the current `DeviceSnapshot` to the caller.
    pub(crate) async fn emit_snapshot(&mut self) {
        let snapshot = self.snapshot_tx.borrow().clone();

        let _ = self
            .send_out(SupervisorOutputMessage::Snapshot(snapshot))
            .await;
    }

    /// Send the current `LongPollStatus` to the caller.
    pub(crate) async fn emit_long_poll_status(&mut self) {
        let _ = self
            .send_out(SupervisorOutputMessage::LongPollStatus(
                self.long_poll_status(),
            ))
            .await;
    }

    /// Send whether interval polling is active to the caller.
    pub(crate) async fn emit_interval_polling(&mut self) {
        let _ = self
            .send_out(SupervisorOutputMessage::IntervalPolling(
                self.interval.is_some(),
            ))
            .await;
    }

    fn long_poll_status(&self) -> LongPollStatus {
        if self.is_long_poll_confirmed {
            return LongPollStatus::Confirmed;
        }

        if self.pending_retry.is_some() {
            return LongPollStatus::RetryScheduled;
        }

        match self.notifier.as_ref().map(|notifier| notifier.state()) {
            Some(NotifierState::Polling | NotifierState::BackingOff) => LongPollStatus::Started,
            Some(NotifierState::Failed) => LongPollStatus::Failed,
            _ => LongPollStatus::Stopped,
        }
    }
}
