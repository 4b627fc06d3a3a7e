use log::warn;

use crate::SupervisorOutputMessage;

use super::SyncSupervisor;

// ------------------------------------------------------------------------------------------------
// Send messages to the caller.
// ------------------------------------------------------------------------------------------------

impl SyncSupervisor {
    /// Send a `SupervisorOutputMessage` back to the caller.
    pub(crate) async fn send_out(&self, message: SupervisorOutputMessage) -> Result<(), ()> {
        self.output_tx.send(message).await.map_err(|_| {
            warn!("Output channel unexpectedly closed");
        })
    }
}
