//! Protocol engine for console-based weather stations.
//!
//! wxconsole talks to a station console over a serial line or a TCP
//! bridge, polls its current conditions, downloads the archive records it
//! logged while nobody was listening, and replays them so that daily
//! housekeeping fires exactly once per day boundary.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial and TCP byte channels
//! - [`frame`]: CRC and fixed-size frame codecs
//! - [`session`]: wake-up, commands, LOOP streams, archive download
//! - [`catchup`]: ordered replay with day-boundary signals
//! - [`station`]: a worker thread running catch-up, then live polling
//! - [`config`]: JSON station configuration

pub mod config;
pub mod error;
pub mod station;

/// Re-export transport types.
pub mod transport {
    pub use wxconsole_transport::*;
}

/// Re-export frame codec types.
pub mod frame {
    pub use wxconsole_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use wxconsole_session::*;
}

/// Re-export catch-up types.
pub mod catchup {
    pub use wxconsole_catchup::*;
}

pub use config::{LiveKind, StationConfig};
pub use error::{Result, StationError};
pub use station::{Station, StationOptions, StationReport, StationStatus, TickOutcome};
