//! Scripted in-memory responder for scheduler, poller and validator tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::{Command, RpcResponse};
use crate::transport::DeviceRpc;

/// Plays back a fixed list of outcomes, one per call, and records every
/// dispatch with its (virtual) timestamp. Once the script runs dry every
/// further call times out, which doubles as a "device went silent" fixture.
pub(crate) struct ScriptedRpc {
    script: VecDeque<Result<RpcResponse>>,
    pub calls: Vec<(Command, Instant)>,
}

impl ScriptedRpc {
    pub fn new(script: Vec<Result<RpcResponse>>) -> Self {
        Self {
            script: script.into(),
            calls: Vec::new(),
        }
    }

    /// A responder that never answers.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DeviceRpc for ScriptedRpc {
    async fn call(&mut self, command: Command) -> Result<RpcResponse> {
        self.calls.push((command, Instant::now()));
        self.script.pop_front().unwrap_or_else(|| {
            Err(Error::Timeout {
                method: command.method(),
                after: Duration::from_secs(5),
            })
        })
    }
}

/// Successful response wrapping `payload` as the result member.
pub(crate) fn response(payload: serde_json::Value) -> Result<RpcResponse> {
    Ok(RpcResponse {
        id: 2000,
        src: None,
        result: Some(payload),
        error: None,
    })
}
