//! Out-of-band device commands
//!
//! Commands resolve the device through the registry and never mutate it.
//! Each attempt is bounded by a timeout; unreachable devices are retried with
//! exponential backoff, while a device that answers with an error status is
//! not.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::actions::transport::DeviceTransport;
use crate::actions::DeviceAction;
use crate::errors::CompanionError;
use crate::registry::Registry;
use crate::storage::settings::ActionSettings;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Dispatch options
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Attempts before giving up
    pub max_attempts: u32,

    /// Delay between attempts
    pub cooldown: CooldownOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            cooldown: CooldownOptions::default(),
        }
    }
}

impl From<&ActionSettings> for DispatchOptions {
    fn from(settings: &ActionSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_attempts: settings.max_attempts.max(1),
            cooldown: CooldownOptions {
                base_delay: Duration::from_millis(settings.backoff_base_ms),
                max_delay: Duration::from_millis(settings.backoff_max_ms),
                ..CooldownOptions::default()
            },
        }
    }
}

/// Action dispatcher
pub struct ActionDispatcher {
    registry: Arc<Registry>,
    transport: Arc<dyn DeviceTransport>,
    options: DispatchOptions,
}

impl ActionDispatcher {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn DeviceTransport>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry,
            transport,
            options,
        }
    }

    /// Blink the device's identify indicator for `minutes` (1 to 10)
    pub async fn identify(&self, hostname: &str, minutes: u32) -> Result<DeviceAction, CompanionError> {
        let action = DeviceAction::identify(minutes)?;
        self.dispatch(hostname, action).await
    }

    pub async fn reboot(&self, hostname: &str) -> Result<DeviceAction, CompanionError> {
        self.dispatch(hostname, DeviceAction::Reboot).await
    }

    pub async fn factory_reset(&self, hostname: &str) -> Result<DeviceAction, CompanionError> {
        self.dispatch(hostname, DeviceAction::FactoryReset).await
    }

    async fn dispatch(
        &self,
        hostname: &str,
        action: DeviceAction,
    ) -> Result<DeviceAction, CompanionError> {
        let address = self.registry.route(hostname)?;

        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(
                self.options.timeout,
                self.transport.send(&address, &action),
            )
            .await;

            let failure = match result {
                Ok(Ok(reply)) if reply.is_success() => {
                    info!("Sent {} to {}", action.name(), hostname);
                    return Ok(action);
                }
                Ok(Ok(reply)) => {
                    return Err(CompanionError::UpstreamUnavailable(format!(
                        "Device responded with {}",
                        reply.status
                    )));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "Device {} did not respond within {:?}",
                    hostname, self.options.timeout
                ),
            };

            attempt += 1;
            if attempt >= self.options.max_attempts {
                warn!(
                    "Giving up on {} for {} after {} attempts: {}",
                    action.name(),
                    hostname,
                    attempt,
                    failure
                );
                return Err(CompanionError::UpstreamUnavailable(failure));
            }

            let delay = calc_exp_backoff(&self.options.cooldown, attempt - 1);
            warn!(
                "{} to {} failed (attempt {}), retrying in {:?}: {}",
                action.name(),
                hostname,
                attempt,
                delay,
                failure
            );
            tokio::time::sleep(delay).await;
        }
    }
}
