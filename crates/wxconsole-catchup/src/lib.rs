//! Historic catch-up sequencing for weather-station consoles.
//!
//! After an outage the archive download replays every missed record.
//! [`CatchupSequencer`] consumes that stream in timestamp order and:
//! - fires day-boundary housekeeping (rollover, midnight, 9 am, snow hour)
//!   exactly once per boundary crossing
//! - forwards each reading to a [`SampleSink`] in a fixed order, skipping
//!   missing and implausible values
//!
//! The business rules behind the boundaries and the derivations behind the
//! sink are collaborators supplied by the caller.

pub mod boundary;
pub mod config;
pub mod daylight;
pub mod error;
pub mod sequencer;
pub mod sink;

pub use boundary::{roll_hour, BoundaryEvents, RolloverState, MIDNIGHT_HOUR, NINE_AM_HOUR};
pub use config::{PlausibilityLimits, RolloverConfig};
pub use daylight::{DaylightProbe, LocalDaylight, NoDaylight};
pub use error::{CatchupError, Result};
pub use sequencer::{CatchupSequencer, CatchupStats};
pub use sink::{DayBoundaryHandler, Sample, SampleSink};
