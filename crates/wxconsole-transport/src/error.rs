use std::time::Duration;

/// Errors that can occur in console transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Every connection attempt to the endpoint failed.
    #[error("failed to connect to {endpoint} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        source: std::io::Error,
    },

    /// The endpoint string could not be parsed.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// An operation was attempted while the link is closed.
    #[error("transport not connected: {0}")]
    NotConnected(String),

    /// A timed read did not complete before its deadline.
    #[error("read timed out after {timeout:?} ({received} of {expected} bytes)")]
    Timeout {
        expected: usize,
        received: usize,
        timeout: Duration,
    },

    /// The remote end closed the connection.
    #[error("connection closed by remote")]
    Closed,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port driver reported an error.
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Whether this error is a read deadline expiring (nothing is broken).
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
