use std::path::PathBuf;

use wxconsole_catchup::CatchupError;
use wxconsole_session::{FaultClass, SessionError};
use wxconsole_transport::TransportError;

/// Errors that can occur while configuring or running a station.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    /// A setting is out of range or inconsistent.
    #[error("invalid station config: {0}")]
    InvalidConfig(String),

    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid JSON for a station.
    #[error("invalid station config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Catchup(#[from] CatchupError),

    /// The worker thread could not be started.
    #[error("failed to spawn station worker: {0}")]
    Spawn(std::io::Error),

    #[error("station worker panicked")]
    WorkerPanicked,
}

impl StationError {
    pub fn fault(&self) -> FaultClass {
        match self {
            StationError::InvalidConfig(_) | StationError::Io { .. } | StationError::Json(_) => {
                FaultClass::Config
            }
            StationError::Transport(TransportError::Shutdown) => FaultClass::Shutdown,
            StationError::Transport(_) | StationError::Spawn(_) | StationError::WorkerPanicked => {
                FaultClass::Transport
            }
            StationError::Session(err) => err.fault(),
            StationError::Catchup(err) => err.fault(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_follow_the_wrapped_error() {
        let err = StationError::from(SessionError::NoAck {
            command: "LOOP 1".into(),
        });
        assert_eq!(err.fault(), FaultClass::Protocol);

        let err = StationError::from(CatchupError::InvalidConfig("snow_hour".into()));
        assert_eq!(err.fault(), FaultClass::Config);

        let err = StationError::from(TransportError::Shutdown);
        assert_eq!(err.fault(), FaultClass::Shutdown);

        let err = StationError::from(TransportError::Closed);
        assert_eq!(err.fault(), FaultClass::Transport);
    }
}
