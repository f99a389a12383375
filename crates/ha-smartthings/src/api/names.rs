//! Capability and attribute names reported by the SmartThings cloud

/// Capabilities a device may advertise
pub mod capability {
    pub const SWITCH: &str = "switch";
    pub const SWITCH_LEVEL: &str = "switchLevel";
    pub const FAN_SPEED: &str = "fanSpeed";
    pub const COLOR_CONTROL: &str = "colorControl";
}

/// Attributes reported under a capability
pub mod attribute {
    pub const SWITCH: &str = "switch";
    pub const LEVEL: &str = "level";
    pub const FAN_SPEED: &str = "fanSpeed";
}

/// Commands sent to a capability
pub mod command {
    pub const ON: &str = "on";
    pub const OFF: &str = "off";
    pub const SET_FAN_SPEED: &str = "setFanSpeed";
}
