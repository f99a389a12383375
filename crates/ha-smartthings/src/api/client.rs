//! HTTP client for the SmartThings REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::device::{DeviceCommand, DeviceDescription, DeviceStatus};
use super::{ApiError, ApiResult, DeviceApi};
use crate::config::SmartThingsConfig;

pub const API_BASE_URL: &str = "https://api.smartthings.com/v1/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    items: Vec<DeviceDescription>,
    #[serde(default, rename = "_links")]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct Links {
    next: Option<Link>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
}

/// Client authenticated with a personal access token
pub struct SmartThingsApi {
    client: Client,
    base_url: String,
    token: String,
}

impl SmartThingsApi {
    pub fn new(token: impl Into<String>) -> ApiResult<Self> {
        Self::with_base_url(API_BASE_URL, token)
    }

    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> ApiResult<Self> {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Client for the installation a config entry describes
    pub fn from_config(config: &SmartThingsConfig) -> ApiResult<Self> {
        Self::with_base_url(config.api_base_url.clone(), config.access_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.token)
    }

    async fn send_json(&self, request: RequestBuilder) -> ApiResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DeviceApi for SmartThingsApi {
    /// Every device of a location, following `_links.next` across pages
    #[instrument(skip(self))]
    async fn devices(&self, location_id: &str) -> ApiResult<Vec<DeviceDescription>> {
        let mut devices = Vec::new();
        let mut request = self.get("devices").query(&[("locationId", location_id)]);

        loop {
            let page: DeviceList = serde_json::from_value(self.send_json(request).await?)?;
            debug!(count = page.items.len(), "Fetched device page");
            devices.extend(page.items);

            match page.links.and_then(|links| links.next) {
                Some(next) => {
                    request = self.client.get(next.href).bearer_auth(&self.token);
                }
                None => break,
            }
        }

        Ok(devices)
    }

    #[instrument(skip(self))]
    async fn device_status(&self, device_id: &str) -> ApiResult<DeviceStatus> {
        let body = self
            .send_json(self.get(&format!("devices/{}/status", device_id)))
            .await?;
        Ok(DeviceStatus::from_response(&body))
    }

    #[instrument(skip(self, command), fields(capability = %command.capability, command = %command.command))]
    async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> ApiResult<bool> {
        let response = self
            .client
            .post(self.url(&format!("devices/{}/commands", device_id)))
            .bearer_auth(&self.token)
            .json(&json!({ "commands": [command] }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            // The device exists but refused the command or its arguments
            StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            status => Err(ApiError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            }),
        }
    }
}
