use wxconsole_frame::FrameError;
use wxconsole_transport::TransportError;

/// How the caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Link-level failure: reconnect and retry the whole cycle later.
    Transport,
    /// The console misbehaved: abandon this operation, keep the session.
    Protocol,
    /// A single value was implausible: drop it, keep the record.
    DataRange,
    /// Settings disagree with the console; log loudly and carry on.
    Config,
    /// Shutdown was requested: stop, do not retry.
    Shutdown,
}

/// Errors that can occur in console session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The console never answered the wake-up newline.
    #[error("console did not wake after {attempts} attempt(s)")]
    WakeTimeout { attempts: u32 },

    /// A command was not acknowledged, even after retrying.
    #[error("console did not acknowledge '{command}'")]
    NoAck { command: String },

    /// The console replied with something that breaks the protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// An archive page kept failing validation.
    #[error("archive page {page} still invalid after {attempts} attempt(s)")]
    PageRetriesExhausted { page: u16, attempts: u32 },

    /// Shutdown was requested while an operation was in flight.
    #[error("session shut down")]
    Shutdown,
}

impl SessionError {
    /// Classify this error for retry/abort decisions.
    pub fn fault(&self) -> FaultClass {
        match self {
            SessionError::Transport(_) => FaultClass::Transport,
            SessionError::Frame(_)
            | SessionError::WakeTimeout { .. }
            | SessionError::NoAck { .. }
            | SessionError::ProtocolError(_)
            | SessionError::PageRetriesExhausted { .. } => FaultClass::Protocol,
            SessionError::Shutdown => FaultClass::Shutdown,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Transport(err) if err.is_timeout())
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Shutdown => SessionError::Shutdown,
            other => SessionError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn transport_shutdown_becomes_session_shutdown() {
        let err = SessionError::from(TransportError::Shutdown);
        assert!(matches!(err, SessionError::Shutdown));
        assert_eq!(err.fault(), FaultClass::Shutdown);
    }

    #[test]
    fn classifies_faults() {
        let timeout = SessionError::from(TransportError::Timeout {
            expected: 99,
            received: 0,
            timeout: Duration::from_secs(3),
        });
        assert!(timeout.is_timeout());
        assert_eq!(timeout.fault(), FaultClass::Transport);

        let no_ack = SessionError::NoAck {
            command: "DMPAFT".into(),
        };
        assert_eq!(no_ack.fault(), FaultClass::Protocol);
        assert_eq!(
            SessionError::from(FrameError::BadCrc).fault(),
            FaultClass::Protocol
        );
    }
}
