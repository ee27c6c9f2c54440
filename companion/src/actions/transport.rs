//! Device command transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};
use url::Url;

use crate::actions::DeviceAction;
use crate::errors::CompanionError;
use crate::registry::DeviceAddress;

/// Reply from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReply {
    pub status: u16,
}

impl DeviceReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a command to a device. An `Err` means the device could not be
/// reached; any reply, successful or not, is `Ok`.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn send(
        &self,
        address: &DeviceAddress,
        action: &DeviceAction,
    ) -> Result<DeviceReply, CompanionError>;
}

/// HTTP transport posting to the device's REST endpoints
pub struct HttpDeviceTransport {
    client: Client,
    device_host: String,
}

impl HttpDeviceTransport {
    /// Create a transport reaching devices through `device_host`
    pub fn new(device_host: &str, timeout: Duration) -> Result<Self, CompanionError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            device_host: device_host.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, address: &DeviceAddress, action: &DeviceAction) -> Result<Url, CompanionError> {
        let base = format!("http://{}:{}/", self.device_host, address.http_port);
        let mut url = Url::parse(&base)
            .and_then(|base| base.join(action.path()))
            .map_err(|e| CompanionError::ConfigError(format!("Invalid device URL {}: {}", base, e)))?;

        if let DeviceAction::Identify { minutes } = action {
            url.query_pairs_mut()
                .append_pair("minutes", &minutes.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl DeviceTransport for HttpDeviceTransport {
    async fn send(
        &self,
        address: &DeviceAddress,
        action: &DeviceAction,
    ) -> Result<DeviceReply, CompanionError> {
        let url = self.url(address, action)?;
        debug!("POST {}", url);

        let response = self.client.post(url.clone()).send().await.map_err(|e| {
            error!("Device {} unreachable at {}: {}", address.hostname, url, e);
            CompanionError::UpstreamUnavailable(format!(
                "Device {} is unreachable: {}",
                address.hostname, e
            ))
        })?;

        Ok(DeviceReply {
            status: response.status().as_u16(),
        })
    }
}
