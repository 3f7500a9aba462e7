use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::tcp::TcpTransport;
use crate::traits::{Transport, TransportConfig};

/// Line speed used by consoles out of the box.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Where a console can be reached.
///
/// Parses from:
/// - `tcp:HOST:PORT`
/// - `serial:PATH` or `serial:PATH@BAUD`
/// - a bare device path (serial at [`DEFAULT_BAUD_RATE`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { path: String, baud_rate: u32 },
    Tcp { address: String },
}

impl Endpoint {
    /// Build the matching transport. The link is not opened yet.
    pub fn open(&self, config: TransportConfig) -> Result<Box<dyn Transport>> {
        match self {
            Endpoint::Tcp { address } => Ok(Box::new(TcpTransport::new(address.clone(), config))),
            #[cfg(feature = "serial")]
            Endpoint::Serial { path, baud_rate } => Ok(Box::new(crate::serial::SerialTransport::new(
                path.clone(),
                *baud_rate,
                config,
            ))),
            #[cfg(not(feature = "serial"))]
            Endpoint::Serial { path, .. } => {
                let _ = config;
                Err(TransportError::NotConnected(format!(
                    "{path}: built without serial support"
                )))
            }
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }

        if let Some(address) = input.strip_prefix("tcp:") {
            let address = address.trim_start_matches("//");
            let valid = address
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(TransportError::InvalidEndpoint(input.to_string()));
            }
            return Ok(Endpoint::Tcp {
                address: address.to_string(),
            });
        }

        let spec = input.strip_prefix("serial:").unwrap_or(input);
        let (path, baud_rate) = match spec.rsplit_once('@') {
            Some((path, baud)) => {
                let baud = baud
                    .parse::<u32>()
                    .ok()
                    .filter(|baud| *baud > 0)
                    .ok_or_else(|| TransportError::InvalidEndpoint(input.to_string()))?;
                (path, baud)
            }
            None => (spec, DEFAULT_BAUD_RATE),
        };
        if path.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }

        Ok(Endpoint::Serial {
            path: path.to_string(),
            baud_rate,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial { path, baud_rate } => write!(f, "serial:{path}@{baud_rate}"),
            Endpoint::Tcp { address } => write!(f, "tcp:{address}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp() {
        let endpoint: Endpoint = "tcp:192.168.1.50:22222".parse().unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                address: "192.168.1.50:22222".to_string()
            }
        );
    }

    #[test]
    fn parses_serial_with_and_without_baud() {
        let endpoint: Endpoint = "serial:/dev/ttyUSB0@9600".parse().unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600
            }
        );

        let bare: Endpoint = "/dev/ttyS1".parse().unwrap();
        assert_eq!(
            bare,
            Endpoint::Serial {
                path: "/dev/ttyS1".to_string(),
                baud_rate: DEFAULT_BAUD_RATE
            }
        );
    }

    #[test]
    fn rejects_malformed_endpoints() {
        assert!("".parse::<Endpoint>().is_err());
        assert!("tcp:nohost".parse::<Endpoint>().is_err());
        assert!("tcp::80".parse::<Endpoint>().is_err());
        assert!("serial:/dev/ttyUSB0@fast".parse::<Endpoint>().is_err());
        assert!("serial:@19200".parse::<Endpoint>().is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for text in ["tcp:station.local:22222", "serial:COM3@19200"] {
            let endpoint: Endpoint = text.parse().unwrap();
            assert_eq!(endpoint.to_string(), text);
        }
    }

    #[test]
    fn open_builds_unconnected_transport() {
        let endpoint: Endpoint = "tcp:127.0.0.1:1".parse().unwrap();
        let transport = endpoint.open(TransportConfig::default()).unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.endpoint(), "127.0.0.1:1");
    }
}
