//! Command sequencing and device rate limiting
//!
//! Marstek firmware drops or garbles responses when requests arrive back to
//! back, so every dispatch — success or failure — is followed by a mandatory
//! quiet period before the next one. The gap is measured from the completion
//! of one call to the dispatch of the next and also spans sequence
//! boundaries, so validation attempts and consecutive cycles cannot hammer
//! the device either.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{Command, RpcResponse};
use crate::transport::DeviceRpc;

/// Executes ordered command sequences against one endpoint with a minimum
/// delay between consecutive device calls.
pub struct CommandScheduler<T: DeviceRpc> {
    rpc: T,
    gap: Duration,
    last_finished: Option<Instant>,
}

impl<T: DeviceRpc> CommandScheduler<T> {
    pub fn new(rpc: T, gap: Duration) -> Self {
        Self {
            rpc,
            gap,
            last_finished: None,
        }
    }

    /// Run every command in order, collecting a per-command outcome. A
    /// failed command is recorded and the sequence continues; the result
    /// list always has one entry per requested command, in request order.
    pub async fn run_sequence(
        &mut self,
        commands: &[Command],
    ) -> Vec<(Command, Result<RpcResponse>)> {
        let mut results = Vec::with_capacity(commands.len());
        for &command in commands {
            let outcome = self.dispatch(command).await;
            if let Err(e) = &outcome {
                warn!(method = command.method(), error = %e, "command failed");
            }
            results.push((command, outcome));
        }
        results
    }

    /// Dispatch a single command, honoring the inter-command gap. Used by
    /// `run_sequence` and directly by the connection validator, which needs
    /// the same pacing for its retry attempts.
    pub async fn dispatch(&mut self, command: Command) -> Result<RpcResponse> {
        if let Some(finished) = self.last_finished {
            let earliest = finished + self.gap;
            if earliest > Instant::now() {
                debug!(method = command.method(), "waiting out inter-command gap");
            }
            tokio::time::sleep_until(earliest).await;
        }
        let outcome = self.rpc.call(command).await;
        self.last_finished = Some(Instant::now());
        outcome
    }

    pub(crate) fn rpc(&self) -> &T {
        &self.rpc
    }
}
