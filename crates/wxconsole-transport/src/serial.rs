use std::io::Write;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::io::{connect_with_retry, read_exact_deadline};
use crate::traits::{Transport, TransportConfig};

/// Console attached to a local serial port (8N1, no flow control).
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    config: TransportConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create an unconnected transport for the device at `path`.
    pub fn new(path: impl Into<String>, baud_rate: u32, config: TransportConfig) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            config,
            port: None,
        }
    }

    /// Configured line speed.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn open(&self) -> std::io::Result<Box<dyn SerialPort>> {
        serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(self.config.write_timeout)
            .open()
            .map_err(std::io::Error::from)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        let path = &self.path;
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(path.clone()))
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = connect_with_retry(&self.path, &self.config, || self.open())?;
        info!(port = %self.path, baud = self.baud_rate, "opened serial port");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.path, "closed serial port");
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let shutdown = self.config.shutdown.clone();
        let port = self.port_mut()?;
        read_exact_deadline(port.as_mut(), buf, timeout, &shutdown, |port, slice| {
            port.set_timeout(slice).map_err(std::io::Error::from)
        })
    }

    fn discard_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn discard_output(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Output)?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("connected", &self.port.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_after_bounded_attempts() {
        let config = TransportConfig {
            connect_attempts: 2,
            retry_delay: Duration::from_millis(1),
            ..TransportConfig::default()
        };
        let mut transport =
            SerialTransport::new("/dev/wxconsole-does-not-exist", 19_200, config);
        let err = transport.connect().unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { attempts: 2, .. }));
        assert!(!transport.is_connected());
        assert_eq!(transport.endpoint(), "/dev/wxconsole-does-not-exist");
    }

    #[test]
    fn io_before_connect_is_rejected() {
        let mut transport = SerialTransport::new("/dev/null", 19_200, TransportConfig::default());
        assert!(matches!(
            transport.discard_input(),
            Err(TransportError::NotConnected(_))
        ));
    }
}
