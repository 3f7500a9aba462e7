use std::time::Duration;

use wxconsole_transport::ShutdownSignal;

/// Timing and retry constants for one console session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Newlines sent before giving up on a wake-up.
    pub wake_attempts: u32,
    /// How long to wait for LF CR after each wake newline.
    pub wake_timeout: Duration,
    /// How long a console stays awake after the last exchange.
    pub awake_window: Duration,
    /// Wait for ACK or OK after a text command.
    pub ack_timeout: Duration,
    /// Extra attempts for an unacknowledged command.
    pub command_retries: u32,
    /// Wait for ACK after the DMPAFT date/time frame.
    pub dmpaft_ack_timeout: Duration,
    /// Wait for one archive page or the page-count header.
    pub page_timeout: Duration,
    /// Passes at one archive page (first try included).
    pub page_retries: u32,
    /// Pause before asking for a page again.
    pub page_retry_delay: Duration,
    /// Maximum silence between two LOOP frames.
    pub loop_watchdog: Duration,
    /// Observed at every blocking wait.
    pub shutdown: ShutdownSignal,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wake_attempts: 3,
            wake_timeout: Duration::from_millis(1200),
            awake_window: Duration::from_secs(110),
            ack_timeout: Duration::from_secs(2),
            command_retries: 1,
            dmpaft_ack_timeout: Duration::from_secs(30),
            page_timeout: Duration::from_secs(10),
            page_retries: 4,
            page_retry_delay: Duration::from_millis(200),
            loop_watchdog: Duration::from_secs(3),
            shutdown: ShutdownSignal::default(),
        }
    }
}
