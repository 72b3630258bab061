//! Host/port pairs used in seed lists.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port assumed when a seed omits one.
pub const DEFAULT_PORT: u16 = 27017;

/// Address of a single replica-set member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerAddress {
    /// Creates a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `[v6]:port`.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ProtocolError::invalid_address(input, "empty address"));
        }

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let end = rest
                .find(']')
                .ok_or_else(|| ProtocolError::invalid_address(input, "unterminated '['"))?;
            let host = &rest[..end];
            let port = match &rest[end + 1..] {
                "" => None,
                tail => Some(tail.strip_prefix(':').ok_or_else(|| {
                    ProtocolError::invalid_address(input, "expected ':' after ']'")
                })?),
            };
            (host, port)
        } else {
            let (host, port) = match input.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            };
            if host.contains(':') {
                return Err(ProtocolError::invalid_address(
                    input,
                    "IPv6 addresses must be enclosed in '[' ']'",
                ));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(ProtocolError::invalid_address(input, "missing host"));
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| ProtocolError::invalid_address(input, "port is not a number"))?,
        };
        if port == 0 {
            return Err(ProtocolError::invalid_address(input, "port must be non-zero"));
        }

        Ok(Self::new(host, port))
    }

    /// Returns true if the address has a usable host and port.
    pub fn is_valid(&self) -> bool {
        !self.host.trim().is_empty() && self.port != 0
    }
}

impl FromStr for ServerAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_and_port() {
        let addr = ServerAddress::parse("db1.example.com:27018").unwrap();
        assert_eq!(addr, ServerAddress::new("db1.example.com", 27018));
        assert_eq!(addr.to_string(), "db1.example.com:27018");
    }

    #[test]
    fn parse_defaults_port() {
        let addr: ServerAddress = "localhost".parse().unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_ipv6() {
        let addr = ServerAddress::parse("[::1]:27019").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 27019);
        assert_eq!(addr.to_string(), "[::1]:27019");

        let addr = ServerAddress::parse("[fe80::1]").unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse(":27017").is_err());
        assert!(ServerAddress::parse("db1:notaport").is_err());
        assert!(ServerAddress::parse("db1:0").is_err());
        assert!(ServerAddress::parse("[::1").is_err());
        assert!(ServerAddress::parse("::1").is_err());
        assert!(ServerAddress::parse("fe80::1:27017").is_err());
    }

    #[test]
    fn validity() {
        assert!(ServerAddress::new("db1", 27017).is_valid());
        assert!(!ServerAddress::new("  ", 27017).is_valid());
        assert!(!ServerAddress::new("db1", 0).is_valid());
    }
}
