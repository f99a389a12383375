//! Config entry data of a SmartThings installation

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::API_BASE_URL;
use crate::consts::{CONF_ACCESS_TOKEN, CONF_INSTALLED_APP_ID, CONF_LOCATION_ID};

const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config entry data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{field} must be a UUID, got {value:?}")]
    NotUuid { field: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_api_base_url() -> String {
    API_BASE_URL.to_string()
}

/// Credentials and location of one SmartThings installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartThingsConfig {
    pub access_token: String,
    pub location_id: String,
    pub installed_app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl SmartThingsConfig {
    pub fn from_entry_data(data: &HashMap<String, serde_json::Value>) -> ConfigResult<Self> {
        let value = serde_json::to_value(data)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Parse a `smartthings:` block from configuration.yaml
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_entry_data(&self) -> ConfigResult<HashMap<String, serde_json::Value>> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Reject ids and tokens that are not UUIDs
    pub fn validate(&self) -> ConfigResult<()> {
        let uuid = Regex::new(UUID_PATTERN)?;
        for (field, value) in [
            (CONF_ACCESS_TOKEN, &self.access_token),
            (CONF_LOCATION_ID, &self.location_id),
            (CONF_INSTALLED_APP_ID, &self.installed_app_id),
        ] {
            if !uuid.is_match(value) {
                return Err(ConfigError::NotUuid {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}
