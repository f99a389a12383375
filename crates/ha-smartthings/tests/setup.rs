//! Config entry setup against a mock SmartThings server

mod common;

use common::{TestContext, ACCESS_TOKEN, LOCATION_ID};
use ha_config_entries::{ConfigEntry, ConfigEntryState};
use ha_smartthings::consts::CONF_API_BASE_URL;
use ha_smartthings::{SmartThingsError, DOMAIN};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn add_entry(ctx: &TestContext, server: &MockServer) -> ConfigEntry {
    let mut data = common::entry_data();
    data.insert(
        CONF_API_BASE_URL.to_string(),
        json!(format!("{}/v1", server.uri())),
    );
    ctx.hass
        .config_entries
        .add(ConfigEntry::new(DOMAIN, "Home").with_data(data))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_setup_entry_uses_entry_credentials() {
    let ctx = TestContext::new();
    let server = MockServer::start().await;
    let bearer = format!("Bearer {}", ACCESS_TOKEN);
    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .and(query_param("locationId", LOCATION_ID))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "deviceId": "d1",
                "name": "GE Fan",
                "label": "Fan 1",
                "locationId": LOCATION_ID,
                "components": [{
                    "id": "main",
                    "capabilities": [{"id": "switch"}, {"id": "fanSpeed"}]
                }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/devices/d1/status"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "components": {
                "main": {
                    "switch": {"switch": {"value": "on"}},
                    "fanSpeed": {"fanSpeed": {"value": 2}}
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entry = add_entry(&ctx, &server).await;
    ctx.smartthings
        .async_setup_entry(&entry.entry_id)
        .await
        .unwrap();

    assert_eq!(
        ctx.hass.config_entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::Loaded
    );
    let state = ctx.hass.states.get("fan.fan_1").unwrap();
    assert_eq!(state.state, "on");
    assert_eq!(state.attributes["speed"], json!("medium"));
}

#[tokio::test]
async fn test_setup_entry_retries_when_token_rejected() {
    let ctx = TestContext::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let entry = add_entry(&ctx, &server).await;
    let result = ctx.smartthings.async_setup_entry(&entry.entry_id).await;

    assert!(matches!(result, Err(SmartThingsError::NotReady { .. })));
    assert_eq!(
        ctx.hass.config_entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::SetupRetry
    );
}
