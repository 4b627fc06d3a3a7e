/*!
Asynchronous state sync and control for Philips TVs.

[`SyncSupervisor`] keeps an asynchronous, change-only view of a Philips (Android) TV's state, using
the TV's JointSpace HTTP API.

## Features

* HTTP Digest authentication, with the challenge cached and reused across requests.
* A serialized, rate-limited request queue (the TV's embedded server copes badly with overlapping
  requests).
* Long-poll change notifications, probing HTTPS and plain HTTP transports.
* Interval polling as a fallback, stopped once long-polling has proven itself.
* Change-only updates for power, Ambilight, volume/mute, and the foreground app.
* Typed, best-effort accessors via [`DeviceHandle`].
* Sending [`TvCommand`]s (power, volume, keys, Ambilight, app launches).

## Overview

A `SyncSupervisor` instance:

1. Owns the request pipeline to one TV: an authenticated [`CommandQueue`] for short calls, and a
   [`ChangeNotifier`] for long-poll notifications (each with its own Digest state).
2. Accepts [`SupervisorMessage`] messages from the caller to:
    * Send [`TvCommand`] messages (e.g. set the volume) to the TV.
    * Refresh the TV state on demand.
    * Re-emit all known state.
    * Shut down.
3. Sends [`SupervisorOutputMessage`] updates back to the caller:
    * After the initial poll:
        * The TV's power state, and (if on) its Ambilight, volume, and input state.
        * [`SupervisorOutputMessage::ReadyForDependentInit`].
    * Whenever the TV's state changes (never for unchanged poll results):
        * [`SupervisorOutputMessage::PowerChanged`].
        * [`SupervisorOutputMessage::AmbilightUpdated`].
        * [`SupervisorOutputMessage::VolumeUpdated`].
        * [`SupervisorOutputMessage::InputUpdated`].
    * Whenever the poll mode changes:
        * [`LongPollStatus`] updates.
        * [`SupervisorOutputMessage::IntervalPolling`] updates.
    * Any command errors.

To view the full documentation, clone the repository and run `cargo doc --open`.

Run the example with:

```sh
cargo run --example monitor -- <tv-host> <username> <password>
```

## Instantiating

Describe the TV with [`DeviceSettings`], usually via [`DeviceSettingsBuilder`]. Most TVs
require Digest credentials, which are obtained by pairing with the TV (pairing itself is out of
scope for this crate).

Instantiate a `SyncSupervisor` with [`SyncSupervisorBuilder`], providing the settings and a
channel that will be used to send [`SupervisorMessage`] messages to the supervisor. `build()` will
return a tuple of the supervisor instance itself, and another channel over which the supervisor
will send [`SupervisorOutputMessage`] messages back to the caller. Invalid settings are reported
as an error.

```
use philipstv_manager::{DeviceSettingsBuilder, SyncSupervisorBuilder};
use tokio::sync::mpsc;

# #[tokio::main]
# async fn main() {
let settings = DeviceSettingsBuilder::new("10.0.0.101")
    .with_credentials("user", "secret")
    .build();

let (to_supervisor, to_supervisor_rx) = mpsc::channel(32);
let (mut supervisor, mut from_supervisor) = SyncSupervisorBuilder::new(settings, to_supervisor_rx)
    .build()
    .unwrap();

// Send messages with to_supervisor.send()
// Receive messages with from_supervisor.recv()
// Run with supervisor.run().await
# }
```

`DeviceSettings` also implements `serde::Deserialize`, so it can be loaded from a configuration
file:

```
use philipstv_manager::DeviceSettings;

let settings: DeviceSettings = serde_json::from_str(r#"{
    "host": "10.0.0.101",
    "credentials": { "username": "user", "password": "secret" },
    "poll_interval_secs": 20
}"#).unwrap();

assert!(settings.validate().is_ok());
```

## Polling

After a short startup delay, the supervisor polls the TV once: power state first and then, only
if the TV is on, Ambilight, volume, and the current app. It then emits
[`SupervisorOutputMessage::ReadyForDependentInit`] and starts interval polling.

If the TV is on, a long-poll session is started alongside interval polling. The TV answers a
long-poll request whenever a subscribed resource changes. Some resources (`context` by default;
see [`DeviceSettingsBuilder::with_noise_resources()`]) change constantly and tell us nothing; the
first notification for any other resource confirms that long-polling works, at which point
interval polling is stopped. Every notification triggers a full poll, since notifications only
name what changed.

If long-polling fails repeatedly it gives up, interval polling resumes, and long-polling is
retried after a cooldown. Long-polling is stopped whenever the TV enters standby, and started
again when it wakes.

## Sending commands

Commands are sent using [`SupervisorMessage::SendTvCommand`]. Supported commands can be seen in
[`TvCommand`]. A failed command results in a [`SupervisorOutputMessage::Error`]. Any changes to
the TV's state are reported with the usual update messages.

Alternatively, a [`DeviceHandle`] (from [`SyncSupervisor::device_handle()`]) provides async
accessors and [`DeviceHandle::send_command()`], which returns the command's result directly.

## Shutting down

Send [`SupervisorMessage::ShutDown`], drop the sender, or cancel the token from
[`SyncSupervisor::shutdown_token()`]. All polling stops before [`SyncSupervisor::run()`]
returns.

## Lower-level components

[`ChangeNotifier`], [`CommandQueue`], [`RequestChannel`], and [`AuthCache`] are usable on their
own. All network access goes through the [`HttpTransport`] trait; [`ReqwestTransport`] is the
default implementation.
*/

mod auth_cache;
mod change_notifier;
mod command_queue;
mod device_handle;
mod device_settings;
mod errors;
mod helpers;
mod http_transport;
mod jointspace_payloads;
mod notifier_state_machine;
mod request_channel;
mod state;
mod sync_supervisor;
mod sync_supervisor_builder;
mod tv_commands;

#[cfg(test)]
mod test_support;

pub use auth_cache::AuthCache;
pub use change_notifier::{ChangeNotifier, NotifierEvent};
pub use command_queue::{CommandQueue, PendingRequest};
pub use device_handle::DeviceHandle;
pub use device_settings::{Credentials, DeviceSettings, DeviceSettingsBuilder};
pub use errors::DeviceError;
pub use http_transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use jointspace_payloads::NotificationMap;
pub use notifier_state_machine::NotifierState;
pub use request_channel::RequestChannel;
pub use state::{AmbilightState, DeviceSnapshot, VolumeState};
pub use sync_supervisor::{
    LongPollStatus, SupervisorError, SupervisorMessage, SupervisorOutputMessage, SyncSupervisor,
};
pub use sync_supervisor_builder::SyncSupervisorBuilder;
pub use tv_commands::TvCommand;
