//! Philips TV queries and control commands.
//!
//! Each [`TvCommand`] maps onto one JointSpace API call. Paths are relative to the device's API
//! base URL (e.g. `https://192.168.1.20:1926/6/`).

use std::fmt;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::command_queue::PendingRequest;
use crate::jointspace_payloads::{
    ActivityComponent, AmbilightConfigurationPayload, AmbilightPowerPayload, PowerStatePayload,
};
use crate::state::DeviceSnapshot;

pub(crate) const POWER_STATE_PATH: &str = "powerstate";
pub(crate) const AMBILIGHT_CONFIGURATION_PATH: &str = "ambilight/currentconfiguration";
pub(crate) const AMBILIGHT_POWER_PATH: &str = "ambilight/power";
pub(crate) const VOLUME_PATH: &str = "audio/volume";
pub(crate) const CURRENT_ACTIVITY_PATH: &str = "activities/current";
const INPUT_KEY_PATH: &str = "input/key";
const LAUNCH_ACTIVITY_PATH: &str = "activities/launch";

/// Philips TV queries and commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TvCommand {
    /// Get the power state (`On` or `Standby`).
    GetPowerState,
    /// Get the full Ambilight configuration (style and menu setting).
    GetAmbilightConfiguration,
    /// Get the Ambilight on/off state. Supported by TVs which don't report a configuration.
    GetAmbilightPower,
    /// Get the volume level and mute state.
    GetVolume,
    /// Get the foreground activity (app).
    GetCurrentActivity,
    /// Set the power state (`true` is on, `false` is standby).
    SetPowerState(bool),
    /// Set the volume level. The current mute state is preserved.
    SetVolume(u8),
    /// Set the mute state (`true` is muted). The current volume level is preserved.
    SetMute(bool),
    /// Send a remote-control key press, e.g. `VolumeUp` or `Home`.
    SendKey(String),
    /// Turn Ambilight on or off.
    SetAmbilightPower(bool),
    /// Set the Ambilight style (e.g. `FOLLOW_VIDEO`) with an optional menu setting (e.g.
    /// `NATURAL`).
    SetAmbilightStyle {
        style: String,
        setting: Option<String>,
    },
    /// Launch an app by Android package and activity class name.
    LaunchApp { package: String, class: String },
}

impl fmt::Display for TvCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TvCommand::SetPowerState(val) => write!(f, "SetPowerState({})", val),
            TvCommand::SetVolume(val) => write!(f, "SetVolume({})", val),
            TvCommand::SetMute(val) => write!(f, "SetMute({})", val),
            TvCommand::SendKey(key) => write!(f, "SendKey({})", key),
            TvCommand::SetAmbilightPower(val) => write!(f, "SetAmbilightPower({})", val),
            TvCommand::SetAmbilightStyle { style, setting } => match setting {
                Some(setting) => write!(f, "SetAmbilightStyle({}, {})", style, setting),
                None => write!(f, "SetAmbilightStyle({})", style),
            },
            TvCommand::LaunchApp { package, .. } => write!(f, "LaunchApp({})", package),
            variant => write!(f, "{:?}", variant),
        }
    }
}

impl TvCommand {
    /// Whether this command only reads state from the TV.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            TvCommand::GetPowerState
                | TvCommand::GetAmbilightConfiguration
                | TvCommand::GetAmbilightPower
                | TvCommand::GetVolume
                | TvCommand::GetCurrentActivity
        )
    }

    /// Build the request for this command.
    ///
    /// Volume and mute are set together on the TV, so `SetVolume` and `SetMute` carry whatever
    /// the snapshot knows about the other half.
    pub fn request(&self, snapshot: &DeviceSnapshot, timeout: Duration) -> PendingRequest {
        match self {
            TvCommand::GetPowerState => PendingRequest::get(POWER_STATE_PATH, timeout),
            TvCommand::GetAmbilightConfiguration => {
                PendingRequest::get(AMBILIGHT_CONFIGURATION_PATH, timeout)
            }
            TvCommand::GetAmbilightPower => PendingRequest::get(AMBILIGHT_POWER_PATH, timeout),
            TvCommand::GetVolume => PendingRequest::get(VOLUME_PATH, timeout),
            TvCommand::GetCurrentActivity => PendingRequest::get(CURRENT_ACTIVITY_PATH, timeout),
            TvCommand::SetPowerState(is_on) => PendingRequest::post(
                POWER_STATE_PATH,
                to_body(&PowerStatePayload::new(*is_on)),
                timeout,
            ),
            TvCommand::SetVolume(level) => {
                let mut body = Map::new();
                body.insert("current".into(), Value::from(*level));

                if let Some(volume) = &snapshot.volume {
                    body.insert("muted".into(), Value::Bool(volume.is_muted));
                }

                PendingRequest::post(VOLUME_PATH, Value::Object(body).to_string(), timeout)
            }
            TvCommand::SetMute(is_muted) => {
                let mut body = Map::new();
                body.insert("muted".into(), Value::Bool(*is_muted));

                if let Some(volume) = &snapshot.volume {
                    body.insert("current".into(), Value::from(volume.level));
                }

                PendingRequest::post(VOLUME_PATH, Value::Object(body).to_string(), timeout)
            }
            TvCommand::SendKey(key) => {
                PendingRequest::post(INPUT_KEY_PATH, json!({ "key": key }).to_string(), timeout)
            }
            TvCommand::SetAmbilightPower(is_on) => PendingRequest::post(
                AMBILIGHT_POWER_PATH,
                to_body(&AmbilightPowerPayload::new(*is_on)),
                timeout,
            ),
            TvCommand::SetAmbilightStyle { style, setting } => PendingRequest::post(
                AMBILIGHT_CONFIGURATION_PATH,
                to_body(&AmbilightConfigurationPayload {
                    style_name: style.clone(),
                    is_expert: false,
                    menu_setting: setting.clone(),
                }),
                timeout,
            ),
            TvCommand::LaunchApp { package, class } => PendingRequest::post(
                LAUNCH_ACTIVITY_PATH,
                json!({
                    "intent": {
                        "action": "empty",
                        "component": ActivityComponent {
                            package_name: package.clone(),
                            class_name: class.clone(),
                        },
                    }
                })
                .to_string(),
                timeout,
            ),
        }
    }
}

fn to_body<T: serde::Serialize>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| String::new())
}

// ================================================================================================
// Tests
