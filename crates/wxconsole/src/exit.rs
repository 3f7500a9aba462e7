use std::fmt;
use std::io;

use wxconsole::catchup::CatchupError;
use wxconsole::frame::FrameError;
use wxconsole::session::SessionError;
use wxconsole::transport::TransportError;
use wxconsole::StationError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::ConnectFailed { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::InvalidEndpoint(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Shutdown => CliError::new(FAILURE, format!("{context}: interrupted")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::TimestampOutOfRange(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::WakeTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::NoAck { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        SessionError::ProtocolError(_) | SessionError::PageRetriesExhausted { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SessionError::Shutdown => CliError::new(FAILURE, format!("{context}: interrupted")),
    }
}

pub fn catchup_error(context: &str, err: CatchupError) -> CliError {
    match err {
        CatchupError::Session(err) => session_error(context, err),
        CatchupError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        CatchupError::OutOfOrder { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn station_error(context: &str, err: StationError) -> CliError {
    match err {
        StationError::Transport(err) => transport_error(context, err),
        StationError::Session(err) => session_error(context, err),
        StationError::Catchup(err) => catchup_error(context, err),
        StationError::Io { source, path } => io_error(&format!("{context}: {}", path.display()), source),
        StationError::InvalidConfig(_) | StationError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn session_errors_map_to_exit_codes() {
        let timeout = SessionError::Transport(TransportError::Timeout {
            expected: 99,
            received: 0,
            timeout: Duration::from_secs(3),
        });
        assert_eq!(session_error("live", timeout).code, TIMEOUT);
        assert_eq!(session_error("live", SessionError::WakeTimeout { attempts: 3 }).code, TIMEOUT);
        assert_eq!(
            session_error("dump", SessionError::PageRetriesExhausted { page: 2, attempts: 4 }).code,
            DATA_INVALID
        );
        assert_eq!(
            session_error("open", SessionError::Transport(TransportError::InvalidEndpoint("x".into()))).code,
            USAGE
        );
    }

    #[test]
    fn station_errors_unwrap_to_the_cause() {
        let err = StationError::Catchup(CatchupError::Session(SessionError::NoAck {
            command: "DMPAFT".into(),
        }));
        let mapped = station_error("catch-up failed", err);
        assert_eq!(mapped.code, FAILURE);
        assert!(mapped.message.starts_with("catch-up failed: "));

        let err = StationError::InvalidConfig("loop_count must be at least 1".into());
        assert_eq!(station_error("config", err).code, USAGE);
    }
}
