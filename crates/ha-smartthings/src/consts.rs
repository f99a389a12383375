//! Integration-wide names

pub const DOMAIN: &str = "smartthings";

/// Sent with the list of device ids whose status changed
pub const SIGNAL_SMARTTHINGS_UPDATE: &str = "smartthings_update";

/// Entity platforms set up for every config entry
pub const SUPPORTED_PLATFORMS: &[&str] = &["fan"];

/// Reported as the manufacturer of every device; the cloud does not expose it
pub const DEFAULT_MANUFACTURER: &str = "Unavailable";

pub const CONF_ACCESS_TOKEN: &str = "access_token";
pub const CONF_LOCATION_ID: &str = "location_id";
pub const CONF_INSTALLED_APP_ID: &str = "installed_app_id";
pub const CONF_API_BASE_URL: &str = "api_base_url";
