use std::time::Duration;

use crate::error::Result;
use crate::shutdown::ShutdownSignal;

/// A duplex byte channel to one console.
///
/// Every I/O method takes `&mut self`, so a transport can never have two
/// reads outstanding. Implementations do no retrying beyond raw I/O;
/// reconnect policy belongs to the caller.
pub trait Transport: Send {
    /// Open the link, retrying up to the configured number of attempts.
    fn connect(&mut self) -> Result<()>;

    /// Drop the underlying handle. Safe to call when already closed.
    fn close(&mut self);

    /// Whether an underlying handle is currently open.
    fn is_connected(&self) -> bool;

    /// Write all bytes and flush.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` completely, waiting at most `timeout` overall.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;

    /// Drop any bytes received but not yet read.
    fn discard_input(&mut self) -> Result<()>;

    /// Drop any bytes queued but not yet transmitted.
    fn discard_output(&mut self) -> Result<()>;

    /// Endpoint description for diagnostics.
    fn endpoint(&self) -> &str;

    /// Close and reopen the link.
    fn reconnect(&mut self) -> Result<()> {
        self.close();
        self.connect()
    }

    /// Read a single byte.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte, timeout)?;
        Ok(byte[0])
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        (**self).read_exact(buf, timeout)
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }

    fn discard_output(&mut self) -> Result<()> {
        (**self).discard_output()
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }
}

/// Connection and I/O settings shared by all transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Number of connection attempts before `ConnectFailed`.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub retry_delay: Duration,
    /// Timeout for a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Write timeout applied to the underlying handle.
    pub write_timeout: Duration,
    /// Observed during reads and retry sleeps.
    pub shutdown: ShutdownSignal,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(2),
            shutdown: ShutdownSignal::default(),
        }
    }
}
