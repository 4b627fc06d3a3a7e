/// Ambilight state as last reported by the TV.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct AmbilightState {
    pub is_on: bool,
    /// The active style (e.g. `FOLLOW_VIDEO`), when the TV reported its full configuration.
    pub style: Option<String>,
    /// `true` when only the simpler on/off power endpoint answered.
    pub is_fallback: bool,
}

/// Volume state as last reported by the TV.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct VolumeState {
    pub is_muted: bool,
    pub level: u8,
    pub max_level: u8,
}

/// Last-known TV state for the managed Philips TV.
///
/// Every field is `None` until the TV has reported it. Only the supervisor's poll path mutates
/// the snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct DeviceSnapshot {
    pub is_powered_on: Option<bool>,
    pub ambilight: Option<AmbilightState>,
    pub volume: Option<VolumeState>,
    /// Package name of the foreground activity.
    pub active_input: Option<String>,
}

impl DeviceSnapshot {
    pub fn is_on(&self) -> bool {
        self.is_powered_on == Some(true)
    }
}

// ================================================================================================
// Tests
