use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc::Receiver;

use crate::device_settings::DeviceSettings;
use crate::http_transport::HttpTransport;
use crate::{SupervisorMessage, SupervisorOutputMessage, SyncSupervisor};

/// Build a [`SyncSupervisor`] instance.
///
/// ```
/// use philipstv_manager::{DeviceSettingsBuilder, SyncSupervisorBuilder};
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() {
///     let settings = DeviceSettingsBuilder::new("192.168.1.20")
///         .with_credentials("user", "secret")
///         .build();
///
///     let (to_supervisor_tx, to_supervisor_rx) = mpsc::channel(32);
///
///     let (mut supervisor, mut from_supervisor_rx) =
///         SyncSupervisorBuilder::new(settings, to_supervisor_rx)
///             .build()
///             .unwrap();
/// }
/// ```
pub struct SyncSupervisorBuilder {
    settings: DeviceSettings,
    command_receiver: Receiver<SupervisorMessage>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl SyncSupervisorBuilder {
    pub fn new(settings: DeviceSettings, command_receiver: Receiver<SupervisorMessage>) -> Self {
        SyncSupervisorBuilder {
            settings,
            command_receiver,
            transport: None,
        }
    }

    /// Override the default [`ReqwestTransport`](crate::ReqwestTransport) used to reach the TV.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        debug!("Builder is overriding the HTTP transport");

        self.transport = Some(transport);

        self
    }

    /// Build the supervisor. Must be called from within a Tokio runtime.
    ///
    /// Fails if the settings are invalid or the default transport can't be created.
    pub fn build(self) -> Result<(SyncSupervisor, Receiver<SupervisorOutputMessage>), String> {
        debug!(
            "Builder is instantiating a SyncSupervisor for {}",
            &self.settings.host
        );

        match self.transport {
            Some(transport) => {
                SyncSupervisor::with_transport(self.settings, self.command_receiver, transport)
            }
            None => SyncSupervisor::new(self.settings, self.command_receiver),
        }
    }
}

// ================================================================================================
// Tests
