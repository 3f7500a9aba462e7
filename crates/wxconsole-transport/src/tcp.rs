use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::io::{connect_with_retry, read_exact_deadline};
use crate::traits::{Transport, TransportConfig};

const DRAIN_CHUNK: usize = 512;

/// Console reached through a TCP bridge (IP logger or serial server).
pub struct TcpTransport {
    address: String,
    config: TransportConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create an unconnected transport for `host:port`.
    pub fn new(address: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            address: address.into(),
            config,
            stream: None,
        }
    }

    fn open(&self) -> std::io::Result<TcpStream> {
        let mut last_error = None;
        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(Some(self.config.write_timeout))?;
                    return Ok(stream);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            std::io::Error::new(ErrorKind::AddrNotAvailable, "address resolved to nothing")
        }))
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        let address = &self.address;
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(address.clone()))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = connect_with_retry(&self.address, &self.config, || self.open())?;
        info!(endpoint = %self.address, "connected to console over tcp");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(endpoint = %self.address, "closed tcp link");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let shutdown = self.config.shutdown.clone();
        let stream = self.stream_mut()?;
        read_exact_deadline(stream, buf, timeout, &shutdown, |stream, slice| {
            stream.set_read_timeout(Some(slice))
        })
    }

    fn discard_input(&mut self) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.set_nonblocking(true)?;
        let mut chunk = [0u8; DRAIN_CHUNK];
        let mut dropped = 0usize;
        let outcome = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => dropped += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(TransportError::Io(err)),
            }
        };
        stream.set_nonblocking(false)?;
        if dropped > 0 {
            debug!(dropped, "discarded pending input");
        }
        outcome
    }

    fn discard_output(&mut self) -> Result<()> {
        // Bytes handed to the kernel cannot be recalled; just flush.
        self.stream_mut()?.flush()?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("address", &self.address)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}
