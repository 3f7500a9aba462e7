use chrono::NaiveDateTime;
use wxconsole_session::{FaultClass, SessionError};

/// Errors that can occur while sequencing catch-up records.
#[derive(Debug, thiserror::Error)]
pub enum CatchupError {
    /// A record did not come after the last one processed. It was not applied.
    #[error("record at {got} is not after {previous}")]
    OutOfOrder {
        previous: NaiveDateTime,
        got: NaiveDateTime,
    },

    /// Rollover settings that cannot be honoured.
    #[error("invalid rollover config: {0}")]
    InvalidConfig(String),

    /// The record source failed.
    #[error("record source failed: {0}")]
    Session(#[from] SessionError),
}

impl CatchupError {
    pub fn fault(&self) -> FaultClass {
        match self {
            CatchupError::OutOfOrder { .. } => FaultClass::DataRange,
            CatchupError::InvalidConfig(_) => FaultClass::Config,
            CatchupError::Session(err) => err.fault(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatchupError>;
