//! Service call type for invoking services

use crate::{Context, ATTR_ENTITY_ID, ENTITY_MATCH_ALL};
use serde::{Deserialize, Serialize};

/// A call to a service such as `fan.set_speed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain of the service (e.g., "fan")
    pub domain: String,

    /// Service name (e.g., "turn_on")
    pub service: String,

    /// Call data, validated against the service schema
    pub service_data: serde_json::Value,

    /// Context of the caller
    pub context: Context,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Targeted entity ids
    ///
    /// Accepts a single id, a comma separated string of ids, or an array.
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get(ATTR_ENTITY_ID) {
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }

    /// True when the call targets every entity of its domain
    pub fn targets_all(&self) -> bool {
        self.entity_ids().iter().any(|id| id == ENTITY_MATCH_ALL)
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    #[default]
    None,
    Optional,
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(data: serde_json::Value) -> ServiceCall {
        ServiceCall::new("fan", "turn_on", data, Context::new())
    }

    #[test]
    fn test_service_id_and_get() {
        let call = call(json!({"entity_id": "fan.fan_1", "speed": "high"}));
        assert_eq!(call.service_id(), "fan.turn_on");
        assert_eq!(call.get::<String>("speed").as_deref(), Some("high"));
        assert_eq!(call.get::<String>("missing"), None);
    }

    #[test]
    fn test_entity_ids_forms() {
        assert_eq!(call(json!({"entity_id": "fan.a"})).entity_ids(), vec!["fan.a"]);
        assert_eq!(
            call(json!({"entity_id": "fan.a, fan.b"})).entity_ids(),
            vec!["fan.a", "fan.b"]
        );
        assert_eq!(
            call(json!({"entity_id": ["fan.a", "fan.b"]})).entity_ids(),
            vec!["fan.a", "fan.b"]
        );
        assert!(call(json!({})).entity_ids().is_empty());
    }

    #[test]
    fn test_targets_all() {
        assert!(call(json!({"entity_id": "all"})).targets_all());
        assert!(!call(json!({"entity_id": "fan.a"})).targets_all());
    }
}
