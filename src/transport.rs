//! UDP transport with response correlation
//!
//! One `UdpTransport` owns one bound socket and serves one device endpoint.
//! Each `call` emits exactly one request datagram, then waits with an
//! explicit deadline for a datagram echoing the request's correlation id.
//! Mismatched ids and unparseable datagrams are dropped as noise and the
//! wait continues; there are no retries here — retry policy belongs to the
//! scheduler and validator.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::config::MarstekConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, RpcRequest, RpcResponse};

/// Largest datagram the device is known to emit.
const MAX_DATAGRAM: usize = 4096;

/// Single-attempt request/response exchange against one device.
///
/// The seam between the protocol engine and the wire: the scheduler, poller
/// and validator are generic over this, so tests drive them with scripted
/// responders instead of sockets.
#[async_trait]
pub trait DeviceRpc: Send {
    async fn call(&mut self, command: Command) -> Result<RpcResponse>;
}

/// UDP implementation of [`DeviceRpc`] bound to one local port.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    device_id: u32,
    ble_mac: Option<String>,
    timeout: std::time::Duration,
}

impl UdpTransport {
    /// Bind the local socket and resolve the device address.
    pub async fn bind(config: &MarstekConfig) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(("0.0.0.0", config.local_port)).await?;
        let remote = lookup_host(config.remote_addr())
            .await?
            .next()
            .ok_or_else(|| {
                Error::config(format!("cannot resolve device address {}", config.remote_addr()))
            })?;
        debug!(local = %socket.local_addr()?, %remote, "udp transport bound");
        Ok(Self {
            socket,
            remote,
            device_id: config.device_id,
            ble_mac: config.ble_mac.clone(),
            timeout: config.timeout(),
        })
    }

    /// Address of the bound local socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DeviceRpc for UdpTransport {
    async fn call(&mut self, command: Command) -> Result<RpcResponse> {
        let request = RpcRequest::new(command, self.device_id, self.ble_mac.as_deref())?;
        let frame = serde_json::to_vec(&request)?;

        debug!(
            method = request.method,
            id = request.id,
            remote = %self.remote,
            "sending request"
        );
        self.socket.send_to(&frame, self.remote).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf))
                .await
                .map_err(|_| Error::Timeout {
                    method: request.method,
                    after: self.timeout,
                })?;
            let (len, peer) = received?;

            let response: RpcResponse = match serde_json::from_slice(&buf[..len]) {
                Ok(response) => response,
                Err(e) => {
                    debug!(%peer, error = %e, "dropping unparseable datagram");
                    continue;
                }
            };

            if response.id != request.id {
                debug!(
                    expected = request.id,
                    got = response.id,
                    "dropping datagram with mismatched correlation id"
                );
                continue;
            }

            if let Some(error) = &response.error {
                return Err(Error::Device {
                    method: request.method,
                    detail: error.to_string(),
                });
            }

            debug!(method = request.method, id = response.id, %peer, "response correlated");
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    /// Bind a fake device socket and a transport pointed at it. The
    /// transport uses an ephemeral local port so tests never collide.
    async fn transport_and_device(timeout_ms: u64) -> (UdpTransport, UdpSocket) {
        let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind fake device");
        let device_addr = device.local_addr().expect("device addr");

        let mut config = MarstekConfig::new("127.0.0.1");
        config.remote_port = device_addr.port();
        config.local_port = 0;
        config.timeout_ms = timeout_ms;

        let transport = UdpTransport::bind(&config).await.expect("bind transport");
        (transport, device)
    }

    /// Read one request off the fake device socket.
    async fn recv_request(device: &UdpSocket) -> (serde_json::Value, SocketAddr) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, peer) = device.recv_from(&mut buf).await.expect("device recv");
        (serde_json::from_slice(&buf[..len]).expect("request json"), peer)
    }

    #[tokio::test]
    async fn correlated_response_is_returned() {
        let (mut transport, device) = transport_and_device(1000).await;

        let exchange = tokio::spawn(async move {
            let (request, peer) = recv_request(&device).await;
            assert_eq!(request["method"], "Bat.GetStatus");
            let reply = json!({
                "id": request["id"],
                "result": { "soc": 87, "bat_temp": 164.0 }
            });
            device
                .send_to(reply.to_string().as_bytes(), peer)
                .await
                .expect("device send");
        });

        let response = transport.call(Command::BatteryStatus).await.expect("call");
        let result = response.result.expect("result payload");
        assert_eq!(result["soc"], 87);
        exchange.await.expect("device task");
    }

    #[tokio::test]
    async fn noise_is_dropped_until_match() {
        let (mut transport, device) = transport_and_device(1000).await;

        let exchange = tokio::spawn(async move {
            let (request, peer) = recv_request(&device).await;
            // Garbage, then a stray response for someone else, then ours.
            device.send_to(b"not json at all", peer).await.expect("send noise");
            let stray = json!({ "id": 1, "result": { "soc": 1 } });
            device
                .send_to(stray.to_string().as_bytes(), peer)
                .await
                .expect("send stray");
            let reply = json!({ "id": request["id"], "result": { "soc": 87 } });
            device
                .send_to(reply.to_string().as_bytes(), peer)
                .await
                .expect("send reply");
        });

        let response = transport.call(Command::BatteryStatus).await.expect("call");
        assert_eq!(response.result.expect("result")["soc"], 87);
        exchange.await.expect("device task");
    }

    #[tokio::test]
    async fn mismatched_id_alone_times_out() {
        let (mut transport, device) = transport_and_device(200).await;

        let exchange = tokio::spawn(async move {
            let (request, peer) = recv_request(&device).await;
            let wrong = request["id"].as_u64().expect("id") as u16 ^ 1;
            let stray = json!({ "id": wrong, "result": { "soc": 1 } });
            device
                .send_to(stray.to_string().as_bytes(), peer)
                .await
                .expect("send stray");
        });

        let outcome = transport.call(Command::BatteryStatus).await;
        assert!(matches!(outcome, Err(Error::Timeout { .. })));
        exchange.await.expect("device task");
    }

    #[tokio::test]
    async fn device_info_request_carries_mac_string() {
        let device = UdpSocket::bind("127.0.0.1:0").await.expect("bind fake device");
        let device_addr = device.local_addr().expect("device addr");

        let mut config = MarstekConfig::new("127.0.0.1");
        config.remote_port = device_addr.port();
        config.local_port = 0;
        config.timeout_ms = 1000;
        config.ble_mac = Some("AA:BB:CC:DD:EE:FF".to_string());
        let mut transport = UdpTransport::bind(&config).await.expect("bind transport");

        let exchange = tokio::spawn(async move {
            let (request, peer) = recv_request(&device).await;
            assert_eq!(request["method"], "Marstek.GetDevice");
            assert!(request["params"]["ble_mac"].is_string());
            assert_eq!(request["params"]["ble_mac"], "AA:BB:CC:DD:EE:FF");
            let reply = json!({ "id": request["id"], "result": { "device_name": "Venus-E" } });
            device
                .send_to(reply.to_string().as_bytes(), peer)
                .await
                .expect("device send");
        });

        let response = transport.call(Command::DeviceInfo).await.expect("call");
        assert!(response.result.is_some());
        exchange.await.expect("device task");
    }

    #[tokio::test]
    async fn device_info_without_mac_fails_before_sending() {
        let (mut transport, _device) = transport_and_device(1000).await;
        let outcome = transport.call(Command::DeviceInfo).await;
        assert!(matches!(outcome, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn silent_device_times_out() {
        let (mut transport, _device) = transport_and_device(150).await;
        let outcome = transport.call(Command::WifiStatus).await;
        match outcome {
            Err(Error::Timeout { method, after }) => {
                assert_eq!(method, "Wifi.GetStatus");
                assert_eq!(after, Duration::from_millis(150));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_member_becomes_device_error() {
        let (mut transport, device) = transport_and_device(1000).await;

        let exchange = tokio::spawn(async move {
            let (request, peer) = recv_request(&device).await;
            let reply = json!({
                "id": request["id"],
                "error": { "code": -32601, "message": "unknown method" }
            });
            device
                .send_to(reply.to_string().as_bytes(), peer)
                .await
                .expect("device send");
        });

        let outcome = transport.call(Command::ModeStatus).await;
        match outcome {
            Err(Error::Device { method, detail }) => {
                assert_eq!(method, "ES.GetMode");
                assert!(detail.contains("unknown method"));
            }
            other => panic!("expected device error, got {other:?}"),
        }
        exchange.await.expect("device task");
    }
}
