//! Message payloads for the Philips JointSpace HTTP API.
//!
//! These define the shape of the JSON bodies sent to and received from the TV. Only the fields
//! this crate acts on are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ------------------------------------------------------------------------------------------------
// Queries

// GET powerstate

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct PowerStatePayload {
    pub powerstate: String,
}

impl PowerStatePayload {
    pub fn new(is_on: bool) -> Self {
        PowerStatePayload {
            powerstate: String::from(if is_on { "On" } else { "Standby" }),
        }
    }

    pub fn is_on(&self) -> bool {
        self.powerstate.eq_ignore_ascii_case("on")
    }
}

// GET ambilight/currentconfiguration

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct AmbilightConfigurationPayload {
    #[serde(rename = "styleName")]
    pub style_name: String,
    #[serde(rename = "isExpert", default)]
    pub is_expert: bool,
    #[serde(rename = "menuSetting", skip_serializing_if = "Option::is_none")]
    pub menu_setting: Option<String>,
}

impl AmbilightConfigurationPayload {
    pub fn is_on(&self) -> bool {
        !self.style_name.eq_ignore_ascii_case("off")
    }
}

// GET ambilight/power

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct AmbilightPowerPayload {
    pub power: String,
}

impl AmbilightPowerPayload {
    pub fn new(is_on: bool) -> Self {
        AmbilightPowerPayload {
            power: String::from(if is_on { "On" } else { "Off" }),
        }
    }

    pub fn is_on(&self) -> bool {
        self.power.eq_ignore_ascii_case("on")
    }
}

// GET audio/volume

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct VolumePayload {
    pub muted: bool,
    pub current: u8,
    #[serde(default)]
    pub min: u8,
    #[serde(default)]
    pub max: u8,
}

// GET activities/current

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct CurrentActivityPayload {
    pub component: Option<ActivityComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct ActivityComponent {
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "className", default)]
    pub class_name: String,
}

// ------------------------------------------------------------------------------------------------
// Long-poll

/// Resources the long-poll request subscribes to.
pub(crate) const NOTIFY_RESOURCES: [&str; 14] = [
    "context",
    "network/devices",
    "input/textentry",
    "input/pointer",
    "channeldb/tv",
    "activities/tv",
    "activities/current",
    "applications/version",
    "system/epgsource",
    "powerstate",
    "system/nettvversion",
    "system/storage/status",
    "recordings/list",
    "companionlauncher",
];

/// Body for `POST notifychange`.
pub(crate) fn notify_change_request() -> Value {
    let subscriptions: Map<String, Value> = NOTIFY_RESOURCES
        .iter()
        .map(|resource| {
            let empty = match *resource {
                "applications/version" | "system/nettvversion" => Value::String(String::new()),
                "network/devices" | "system/storage/status" => Value::Array(vec![]),
                _ => Value::Object(Map::new()),
            };

            (resource.to_string(), empty)
        })
        .collect();

    let mut body = Map::new();
    body.insert(String::from("notification"), Value::Object(subscriptions));

    Value::Object(body)
}

/// Resources reported as changed by a `notifychange` response.
pub type NotificationMap = Map<String, Value>;

/// Parse a `notifychange` response body. An empty body is an empty notification.
pub(crate) fn parse_notification(body: &str) -> Result<NotificationMap, String> {
    if body.trim().is_empty() {
        return Ok(NotificationMap::new());
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(resources)) => Ok(resources),
        Ok(other) => Err(format!("Unexpected notification payload: {other}")),
        Err(e) => Err(format!("Could not parse notification payload: {e}")),
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{
        notify_change_request, parse_notification, AmbilightConfigurationPayload,
        CurrentActivityPayload, PowerStatePayload, VolumePayload, NOTIFY_RESOURCES,
    };

    #[test]
    fn power_state_payload() {
        let on: PowerStatePayload = serde_json::from_str(r#"{"powerstate":"On"}"#).unwrap();
        let standby: PowerStatePayload =
            serde_json::from_str(r#"{"powerstate":"Standby"}"#).unwrap();

        assert!(on.is_on());
        assert!(!standby.is_on());
        assert_eq!(
            serde_json::to_string(&PowerStatePayload::new(false)).unwrap(),
            r#"{"powerstate":"Standby"}"#
        );
    }

    #[test]
    fn ambilight_configuration_payload() {
        let config: AmbilightConfigurationPayload = serde_json::from_str(
            r#"{"styleName":"FOLLOW_VIDEO","isExpert":false,"menuSetting":"NATURAL"}"#,
        )
        .unwrap();

        assert!(config.is_on());
        assert_eq!(config.menu_setting.as_deref(), Some("NATURAL"));

        let off: AmbilightConfigurationPayload =
            serde_json::from_str(r#"{"styleName":"OFF"}"#).unwrap();
        assert!(!off.is_on());
    }

    #[test]
    fn volume_and_activity_payloads() {
        let volume: VolumePayload =
            serde_json::from_str(r#"{"muted":true,"current":12,"min":0,"max":60}"#).unwrap();
        assert!(volume.muted);
        assert_eq!(volume.current, 12);

        let activity: CurrentActivityPayload = serde_json::from_str(
            r#"{"component":{"packageName":"com.netflix.ninja","className":"com.netflix.ninja.MainActivity"}}"#,
        )
        .unwrap();
        assert_eq!(activity.component.unwrap().package_name, "com.netflix.ninja");
    }

    #[test]
    fn notify_change_request_subscribes_to_all_resources() {
        let request = notify_change_request();
        let subscriptions = request["notification"].as_object().unwrap();

        assert_eq!(subscriptions.len(), NOTIFY_RESOURCES.len());
        assert_eq!(subscriptions["powerstate"], Value::Object(Default::default()));
        assert_eq!(subscriptions["applications/version"], Value::String(String::new()));
    }

    #[test]
    fn notification_parsing() {
        let resources = parse_notification(r#"{"powerstate":{"powerstate":"On"},"context":{}}"#)
            .unwrap();
        assert_eq!(resources.len(), 2);
        assert!(resources.contains_key("powerstate"));

        assert!(parse_notification("").unwrap().is_empty());
        assert!(parse_notification("  \n").unwrap().is_empty());
        assert!(parse_notification("[]").is_err());
        assert!(parse_notification("<html>").is_err());
    }
}
