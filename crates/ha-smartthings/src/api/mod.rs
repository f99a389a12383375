//! SmartThings cloud client

mod client;
mod device;
mod names;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{SmartThingsApi, API_BASE_URL};
pub use device::{
    CapabilityReference, Device, DeviceCommand, DeviceComponent, DeviceDescription,
    DeviceStatus, DeviceTypeHandler, MAIN_COMPONENT,
};
pub use names::{attribute, capability, command};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Operations the integration needs from the cloud
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn devices(&self, location_id: &str) -> ApiResult<Vec<DeviceDescription>>;

    async fn device_status(&self, device_id: &str) -> ApiResult<DeviceStatus>;

    /// Send one command; `Ok(false)` when the cloud rejects it
    async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> ApiResult<bool>;
}
