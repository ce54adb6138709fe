//! JSON-RPC request/response envelopes and the fixed command set
//!
//! Marstek devices speak a JSON-RPC-shaped protocol over single UDP
//! datagrams: `{"id":<n>,"method":"...","params":{...}}` out, and a response
//! echoing `id` with either a `result` payload or an `error` member back.
//! The correlation id is random per call; the transport matches inbound
//! datagrams against it and discards everything else.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Correlation ids are drawn from this range, matching device firmware
/// expectations observed in the field.
const RPC_ID_MIN: u16 = 1000;
const RPC_ID_MAX: u16 = 65000;

/// The fixed set of status commands the device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    BatteryStatus,
    ModeStatus,
    EnergyMeterStatus,
    WifiStatus,
    BleStatus,
    DeviceInfo,
}

impl Command {
    /// The steady-state polling sequence, in dispatch order. The order is
    /// fixed so the inter-command rate limit produces a predictable cycle.
    pub const POLL_SEQUENCE: [Command; 5] = [
        Command::BatteryStatus,
        Command::ModeStatus,
        Command::EnergyMeterStatus,
        Command::WifiStatus,
        Command::BleStatus,
    ];

    /// Every command, including the setup-only `DeviceInfo`.
    pub const ALL: [Command; 6] = [
        Command::BatteryStatus,
        Command::ModeStatus,
        Command::EnergyMeterStatus,
        Command::WifiStatus,
        Command::BleStatus,
        Command::DeviceInfo,
    ];

    /// Remote method name on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Command::BatteryStatus => "Bat.GetStatus",
            Command::ModeStatus => "ES.GetMode",
            Command::EnergyMeterStatus => "EM.GetStatus",
            Command::WifiStatus => "Wifi.GetStatus",
            Command::BleStatus => "BLE.GetStatus",
            Command::DeviceInfo => "Marstek.GetDevice",
        }
    }

    /// Request parameters for this command. Status commands address the
    /// device by numeric id; `DeviceInfo` addresses it by its BLE MAC
    /// string and is rejected when no MAC is configured.
    pub fn params(&self, device_id: u32, ble_mac: Option<&str>) -> Result<Value> {
        match self {
            Command::DeviceInfo => {
                let mac = ble_mac.ok_or_else(|| {
                    Error::config("Marstek.GetDevice requires the device's BLE MAC")
                })?;
                Ok(json!({ "ble_mac": mac }))
            }
            _ => Ok(json!({ "id": device_id })),
        }
    }

    /// Parse a wire method name back into a command.
    pub fn from_method(method: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.method() == method)
    }
}

/// One outbound request datagram.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub id: u16,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    /// Build a request with a fresh correlation id.
    pub fn new(command: Command, device_id: u32, ble_mac: Option<&str>) -> Result<Self> {
        Ok(Self {
            id: rand::thread_rng().gen_range(RPC_ID_MIN..=RPC_ID_MAX),
            method: command.method(),
            params: command.params(device_id, ble_mac)?,
        })
    }
}

/// One inbound response datagram. A datagram that does not deserialize into
/// this shape is protocol noise, not an error.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Echoed correlation id
    pub id: u16,
    /// Device-reported source tag, if present
    #[serde(default)]
    pub src: Option<String>,
    /// Free-form key/value payload on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error indicator on failure
    #[serde(default)]
    pub error: Option<Value>,
}
