//! Setup-time connection validation
//!
//! Before an endpoint is accepted, a lightweight probe command confirms the
//! device is reachable and speaking the protocol. Unlike the steady-state
//! poller, the validator retries on timeout — up to the configured budget,
//! paced by the scheduler's normal inter-command gap. Exhausting the budget
//! yields `Error::Connect`, which the configuration flow surfaces to the
//! user.

use tracing::{info, warn};

use crate::config::MarstekConfig;
use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::scheduler::CommandScheduler;
use crate::transport::DeviceRpc;

/// Retry policy for setup-time validation.
#[derive(Debug, Clone)]
pub struct ValidatePolicy {
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Probe command; battery status is cheap and always supported
    pub probe: Command,
}

impl Default for ValidatePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            probe: Command::BatteryStatus,
        }
    }
}

impl ValidatePolicy {
    pub fn from_config(config: &MarstekConfig) -> Self {
        Self {
            max_attempts: config.setup_retries.max(1),
            ..Self::default()
        }
    }
}

/// Confirms a configured endpoint responds before it is accepted.
#[derive(Debug, Default)]
pub struct ConnectionValidator {
    policy: ValidatePolicy,
}

impl ConnectionValidator {
    pub fn new(policy: ValidatePolicy) -> Self {
        Self { policy }
    }

    /// Probe the device through `scheduler`. A parsed response — even a
    /// device-level error — proves reachability. Recoverable failures
    /// (timeouts, socket hiccups) count against the attempt budget;
    /// anything else will not clear on retry and aborts immediately.
    pub async fn validate<T: DeviceRpc>(
        &self,
        scheduler: &mut CommandScheduler<T>,
    ) -> Result<()> {
        let mut last = String::new();
        for attempt in 1..=self.policy.max_attempts {
            info!(
                attempt,
                max = self.policy.max_attempts,
                method = self.policy.probe.method(),
                "validating device connectivity"
            );
            match scheduler.dispatch(self.policy.probe).await {
                Ok(_) => {
                    info!(attempt, "device responded, connection validated");
                    return Ok(());
                }
                Err(Error::Device { detail, .. }) => {
                    info!(attempt, detail, "device answered with an error, reachable");
                    return Ok(());
                }
                Err(e) if e.is_recoverable() => {
                    warn!(attempt, error = %e, "validation attempt failed");
                    last = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Connect {
            attempts: self.policy.max_attempts,
            last,
        })
    }
}
