//! Station configuration, loaded from JSON.
//!
//! Every field has a default, so a config file only needs the settings
//! that differ:
//!
//! ```json
//! {
//!   "endpoint": "tcp:192.168.1.40:22222",
//!   "loop_kind": "loop2",
//!   "rollover": { "rollover_hour": 9, "use_10am_in_summer": true }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use wxconsole_catchup::{CatchupSequencer, DayBoundaryHandler, PlausibilityLimits, RolloverConfig, SampleSink};
use wxconsole_frame::LoopKind;
use wxconsole_session::{ConsoleSession, SessionConfig};
use wxconsole_transport::{Endpoint, ShutdownSignal, Transport, TransportConfig};

use crate::error::{Result, StationError};

/// Which live frame to poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveKind {
    #[default]
    Loop,
    Loop2,
}

impl From<LiveKind> for LoopKind {
    fn from(kind: LiveKind) -> Self {
        match kind {
            LiveKind::Loop => LoopKind::Loop,
            LiveKind::Loop2 => LoopKind::Loop2,
        }
    }
}

/// Everything needed to run one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    /// `tcp:HOST:PORT`, `serial:PATH[@BAUD]` or a bare device path.
    pub endpoint: String,

    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,

    pub wake_attempts: u32,
    pub wake_timeout_ms: u64,
    pub awake_window_secs: u64,
    pub ack_timeout_ms: u64,
    pub command_retries: u32,
    pub dmpaft_ack_timeout_secs: u64,
    pub page_timeout_ms: u64,
    pub page_retries: u32,
    pub page_retry_delay_ms: u64,
    pub loop_watchdog_ms: u64,

    /// Pause between live polls.
    pub poll_interval_ms: u64,
    pub loop_kind: LiveKind,
    /// Frames requested per live poll.
    pub loop_count: u16,
    /// Archive interval in minutes; read from the console when unset.
    pub archive_interval_minutes: Option<u16>,
    /// How far back the first catch-up reaches when there is no resume point.
    pub catchup_window_hours: u32,
    /// Consecutive transport faults before the station is reported unreachable.
    pub unreachable_after: u32,
    /// Correct the console clock before each catch-up.
    pub sync_clock: bool,
    pub max_clock_drift_secs: u64,

    pub rollover: RolloverConfig,
    pub limits: PlausibilityLimits,
}

impl Default for StationConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        let session = SessionConfig::default();
        Self {
            endpoint: String::new(),
            connect_attempts: transport.connect_attempts,
            retry_delay_ms: millis(transport.retry_delay),
            connect_timeout_ms: millis(transport.connect_timeout),
            write_timeout_ms: millis(transport.write_timeout),
            wake_attempts: session.wake_attempts,
            wake_timeout_ms: millis(session.wake_timeout),
            awake_window_secs: session.awake_window.as_secs(),
            ack_timeout_ms: millis(session.ack_timeout),
            command_retries: session.command_retries,
            dmpaft_ack_timeout_secs: session.dmpaft_ack_timeout.as_secs(),
            page_timeout_ms: millis(session.page_timeout),
            page_retries: session.page_retries,
            page_retry_delay_ms: millis(session.page_retry_delay),
            loop_watchdog_ms: millis(session.loop_watchdog),
            poll_interval_ms: 2_500,
            loop_kind: LiveKind::Loop,
            loop_count: 1,
            archive_interval_minutes: None,
            catchup_window_hours: 24,
            unreachable_after: 5,
            sync_clock: false,
            max_clock_drift_secs: 60,
            rollover: RolloverConfig::default(),
            limits: PlausibilityLimits::default(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl StationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| StationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.rollover.validate()?;
        if self.loop_count == 0 {
            return Err(StationError::InvalidConfig("loop_count must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(StationError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.page_retries == 0 || self.wake_attempts == 0 {
            return Err(StationError::InvalidConfig(
                "page_retries and wake_attempts must be at least 1".into(),
            ));
        }
        if self.archive_interval_minutes == Some(0) {
            return Err(StationError::InvalidConfig(
                "archive_interval_minutes must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        if self.endpoint.trim().is_empty() {
            return Err(StationError::InvalidConfig("endpoint is not set".into()));
        }
        Ok(self.endpoint.parse()?)
    }

    pub fn transport_config(&self, shutdown: &ShutdownSignal) -> TransportConfig {
        TransportConfig {
            connect_attempts: self.connect_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            shutdown: shutdown.clone(),
        }
    }

    pub fn session_config(&self, shutdown: &ShutdownSignal) -> SessionConfig {
        SessionConfig {
            wake_attempts: self.wake_attempts,
            wake_timeout: Duration::from_millis(self.wake_timeout_ms),
            awake_window: Duration::from_secs(self.awake_window_secs),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            command_retries: self.command_retries,
            dmpaft_ack_timeout: Duration::from_secs(self.dmpaft_ack_timeout_secs),
            page_timeout: Duration::from_millis(self.page_timeout_ms),
            page_retries: self.page_retries,
            page_retry_delay: Duration::from_millis(self.page_retry_delay_ms),
            loop_watchdog: Duration::from_millis(self.loop_watchdog_ms),
            shutdown: shutdown.clone(),
        }
    }

    /// Session over the configured endpoint. The link is opened lazily.
    pub fn open_session(&self, shutdown: &ShutdownSignal) -> Result<ConsoleSession<Box<dyn Transport>>> {
        let transport = self.endpoint()?.open(self.transport_config(shutdown))?;
        Ok(ConsoleSession::new(transport, self.session_config(shutdown)))
    }

    /// Sequencer with this station's rollover settings and limits.
    pub fn sequencer<H, S>(&self, handler: H, sink: S) -> Result<CatchupSequencer<H, S>>
    where
        H: DayBoundaryHandler,
        S: SampleSink,
    {
        let sequencer = CatchupSequencer::new(self.rollover.clone(), handler, sink)?;
        Ok(sequencer.with_limits(self.limits.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn catchup_window(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.catchup_window_hours))
    }

    pub fn max_clock_drift(&self) -> Duration {
        Duration::from_secs(self.max_clock_drift_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = StationConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StationConfig::default());
        assert_eq!(config.unreachable_after, 5);
        assert_eq!(config.page_retries, 4);
        assert_eq!(config.wake_timeout_ms, 1200);
        assert_eq!(config.awake_window_secs, 110);
    }

    #[test]
    fn parses_partial_config() {
        let config = StationConfig::from_json_str(
            r#"{
                "endpoint": "tcp:192.168.1.40:22222",
                "loop_kind": "loop2",
                "poll_interval_ms": 10000,
                "archive_interval_minutes": 10,
                "rollover": { "rollover_hour": 9, "use_10am_in_summer": true },
                "limits": { "wind_mph": { "start": 0.0, "end": 120.0 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.loop_kind, LiveKind::Loop2);
        assert_eq!(LoopKind::from(config.loop_kind), LoopKind::Loop2);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.archive_interval_minutes, Some(10));
        assert_eq!(config.rollover.rollover_hour, 9);
        assert!(config.rollover.use_10am_in_summer);
        assert_eq!(config.rollover.snow_hour, 9);
        assert_eq!(config.limits.wind_mph, 0.0..=120.0);
        assert_eq!(config.limits.humidity, 0.0..=100.0);
        assert_eq!(
            config.endpoint().unwrap(),
            Endpoint::Tcp {
                address: "192.168.1.40:22222".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            StationConfig::from_json_str(r#"{"poll_intervall_ms": 5}"#),
            Err(StationError::Json(_))
        ));
        assert!(matches!(
            StationConfig::from_json_str(r#"{"loop_count": 0}"#),
            Err(StationError::InvalidConfig(_))
        ));
        assert!(matches!(
            StationConfig::from_json_str(r#"{"rollover": {"rollover_hour": 6}}"#),
            Err(StationError::Catchup(_))
        ));
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let config = StationConfig::default();
        assert!(matches!(config.endpoint(), Err(StationError::InvalidConfig(_))));
    }

    #[test]
    fn session_config_carries_timings_and_shutdown() {
        let shutdown = ShutdownSignal::new();
        let config = StationConfig {
            page_retries: 2,
            loop_watchdog_ms: 500,
            ..StationConfig::default()
        };
        let session = config.session_config(&shutdown);
        assert_eq!(session.page_retries, 2);
        assert_eq!(session.loop_watchdog, Duration::from_millis(500));

        shutdown.trigger();
        assert!(session.shutdown.is_triggered());
        assert!(config.transport_config(&shutdown).shutdown.is_triggered());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = StationConfig::load("/nonexistent/wxconsole/station.json").unwrap_err();
        assert!(matches!(err, StationError::Io { .. }));
    }
}
