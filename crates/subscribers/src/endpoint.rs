//! Shared datagram endpoints.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::config::EndpointConfig;

/// One UDP sink, shared by every subscriber configured with the same
/// `(address, port)`. Each emitted chunk becomes exactly one datagram.
#[derive(Debug)]
pub struct Endpoint {
    socket: UdpSocket,
    target: SocketAddr,
    config: EndpointConfig,
}

impl Endpoint {
    /// Open a socket able to reach the configured destination.
    pub fn connect(config: EndpointConfig) -> io::Result<Self> {
        let target = SocketAddr::new(config.remote_addr, config.remote_port);
        let bind_addr: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().expect("static v4 bind address")
        } else {
            "[::]:0".parse().expect("static v6 bind address")
        };

        Ok(Self {
            socket: UdpSocket::bind(bind_addr)?,
            target,
            config,
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Send one JSON chunk as one datagram.
    pub fn emit(&self, chunk: &serde_json::Value) -> io::Result<usize> {
        let payload = chunk.to_string();
        self.socket.send_to(payload.as_bytes(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_reaches_local_receiver() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();

        let endpoint = Endpoint::connect(EndpointConfig {
            remote_addr: "127.0.0.1".parse().unwrap(),
            remote_port: port,
        })
        .unwrap();

        endpoint.emit(&json!({"PRICE": {"0": "1.01"}})).unwrap();

        let mut buf = [0u8; 1500];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(value["PRICE"]["0"], "1.01");
    }
}
