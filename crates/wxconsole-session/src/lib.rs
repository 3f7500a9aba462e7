//! Console session management for weather-station consoles.
//!
//! This is the protocol layer. A [`ConsoleSession`] owns one transport and
//! handles the wake-up handshake and the command/acknowledge exchange; on
//! top of it:
//! - [`live::request_loop`] streams LOOP / LOOP2 current conditions
//! - [`archive::download_since`] pages through the archive logger
//!
//! With the `sim` feature, [`sim::SimulatedConsole`] provides a scriptable
//! console for tests and offline runs.

pub mod archive;
pub mod config;
pub mod console;
pub mod error;
pub mod live;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use archive::{download_since, ArchiveDownload, DownloadOptions, DownloadProgress, DEFAULT_INTERVAL_MINUTES};
pub use config::SessionConfig;
pub use console::{ConsoleSession, Expect};
pub use error::{FaultClass, Result, SessionError};
pub use live::{request_loop, Gust, GustTracker, LoopAbort, LoopBatch, LoopOutcome};

#[cfg(any(test, feature = "sim"))]
pub use sim::{SimCounters, SimulatedConsole};
