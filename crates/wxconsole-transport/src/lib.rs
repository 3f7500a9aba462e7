//! Serial and TCP byte transports for weather-station consoles.
//!
//! Provides one capability interface over the two ways a console is
//! reachable:
//! - a local serial port (USB or RS-232 data logger)
//! - a TCP bridge (IP data logger, serial-to-ethernet adapter)
//!
//! This is the lowest layer of wxconsole. The protocol, session and codec
//! layers only ever see the [`Transport`] trait defined here.

pub mod endpoint;
pub mod error;
mod io;
pub mod shutdown;
pub mod tcp;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use endpoint::{Endpoint, DEFAULT_BAUD_RATE};
pub use error::{Result, TransportError};
pub use shutdown::ShutdownSignal;
pub use tcp::TcpTransport;
pub use traits::{Transport, TransportConfig};

#[cfg(feature = "serial")]
pub use serial::SerialTransport;
