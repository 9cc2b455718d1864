//! Endpoint configuration.
//!
//! All three processes agree on the same triple of socket addresses: the
//! transmitter and receiver each bind their own endpoint and address every
//! outbound datagram to the emulator, which distinguishes the two peers by
//! source address alone.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{NETWORK_EMULATOR_PORT, RECEIVER_PORT, TRANSMITTER_PORT};

/// The three endpoints of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Where the transmitter binds.
    pub transmitter: SocketAddr,
    /// Where the emulator binds; next hop for both peers.
    pub emulator: SocketAddr,
    /// Where the receiver binds.
    pub receiver: SocketAddr,
}

impl Endpoints {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.transmitter.port() == 0 || self.emulator.port() == 0 || self.receiver.port() == 0 {
            return Err(Error::config("endpoint ports must be non-zero"));
        }
        if self.transmitter == self.emulator
            || self.transmitter == self.receiver
            || self.emulator == self.receiver
        {
            return Err(Error::config("endpoints must be pairwise distinct"));
        }
        Ok(())
    }

    /// Replace the emulator host, keeping the configured port.
    pub fn with_emulator_host(mut self, host: &str) -> Result<Self> {
        self.emulator = resolve(host, self.emulator.port())?;
        Ok(self)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            transmitter: SocketAddr::from(([127, 0, 0, 1], TRANSMITTER_PORT)),
            emulator: SocketAddr::from(([127, 0, 0, 1], NETWORK_EMULATOR_PORT)),
            receiver: SocketAddr::from(([127, 0, 0, 1], RECEIVER_PORT)),
        }
    }
}

/// Resolve a hostname or IP literal to a socket address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::config(format!("unknown host {}: {}", host, e)))?;
    addrs
        .find(|a| a.is_ipv4())
        .ok_or_else(|| Error::config(format!("no IPv4 address for host {}", host)))
}

/// Configuration file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointsFile {
    /// Transmitter bind address, `ip:port`
    pub transmitter: String,
    /// Emulator bind address, `ip:port`
    pub emulator: String,
    /// Receiver bind address, `ip:port`
    pub receiver: String,
}

impl EndpointsFile {
    /// Convert to runtime configuration.
    pub fn to_endpoints(&self) -> Result<Endpoints> {
        let parse = |label: &str, s: &str| -> Result<SocketAddr> {
            s.parse()
                .map_err(|e| Error::config(format!("invalid {} address {:?}: {}", label, s, e)))
        };
        let endpoints = Endpoints {
            transmitter: parse("transmitter", &self.transmitter)?,
            emulator: parse("emulator", &self.emulator)?,
            receiver: parse("receiver", &self.receiver)?,
        };
        endpoints.validate()?;
        Ok(endpoints)
    }
}

/// Load endpoints from a JSON config file.
pub fn load_endpoints(path: impl AsRef<Path>) -> Result<Endpoints> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
    let file: EndpointsFile = serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("cannot parse {}: {}", path.display(), e)))?;
    file.to_endpoints()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let endpoints = Endpoints::default();
        assert!(endpoints.validate().is_ok());
        assert_eq!(endpoints.transmitter.port(), TRANSMITTER_PORT);
        assert_eq!(endpoints.emulator.port(), NETWORK_EMULATOR_PORT);
        assert_eq!(endpoints.receiver.port(), RECEIVER_PORT);
    }

    #[test]
    fn test_duplicate_endpoints_rejected() {
        let mut endpoints = Endpoints::default();
        endpoints.receiver = endpoints.transmitter;
        assert!(endpoints.validate().is_err());
    }

    #[test]
    fn test_resolve_ip_literal() {
        let addr = resolve("127.0.0.1", 50001).unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 50001)));
    }

    #[test]
    fn test_resolve_unknown_host() {
        assert!(matches!(
            resolve("no-such-host.invalid", 50001),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let file = EndpointsFile {
            transmitter: "10.0.0.1:50000".into(),
            emulator: "10.0.0.2:50001".into(),
            receiver: "10.0.0.3:50002".into(),
        };
        let endpoints = file.to_endpoints().unwrap();
        assert_eq!(endpoints.emulator.port(), 50001);

        let bad = EndpointsFile {
            transmitter: "not-an-addr".into(),
            emulator: "10.0.0.2:50001".into(),
            receiver: "10.0.0.3:50002".into(),
        };
        assert!(bad.to_endpoints().is_err());
    }
}
