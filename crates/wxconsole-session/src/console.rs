use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};
use wxconsole_frame::control::{control_name, CR, LF};
use wxconsole_frame::{
    crc_is_valid, decode_console_time, encode_console_time, ACK, CANCEL, CONSOLE_TIME_FRAME_LEN, NAK,
    OK_REPLY, WAKE_REPLY,
};
use wxconsole_transport::{ShutdownSignal, Transport};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Longest text line accepted from the console (firmware version etc.).
const MAX_TEXT_LINE: usize = 64;

/// Acknowledgement a text command is answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// `"\n\rOK\n\r"`
    Ok,
    /// A single ACK byte.
    Ack,
}

/// One console reached over one transport.
///
/// Every operation takes `&mut self`: a session never has two commands in
/// flight. The console falls asleep on its own a couple of minutes after
/// the last exchange; the session tracks that as a deadline and wakes it
/// again lazily.
pub struct ConsoleSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    awake_until: Option<Instant>,
}

impl<T: Transport> ConsoleSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            awake_until: None,
        }
    }

    /// Open the transport if it is not open yet.
    pub fn connect(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            self.transport.connect()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.config.shutdown
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether the console is still inside its awake window.
    pub fn is_awake(&self) -> bool {
        self.awake_until.is_some_and(|until| Instant::now() < until)
    }

    /// Extend the awake window after a successful exchange.
    pub fn touch(&mut self) {
        self.awake_until = Some(Instant::now() + self.config.awake_window);
    }

    /// Forget the awake window; the next command wakes the console first.
    pub fn mark_asleep(&mut self) {
        self.awake_until = None;
    }

    /// Wake the console unless it is known to be awake.
    pub fn wake_up(&mut self, force: bool) -> Result<()> {
        if !force && self.is_awake() {
            return Ok(());
        }
        self.connect()?;

        let attempts = self.config.wake_attempts.max(1);
        for attempt in 1..=attempts {
            self.config.shutdown.check()?;
            let sent = self
                .transport
                .discard_input()
                .and_then(|()| self.transport.write_all(&[LF]));
            self.link(sent)?;

            let mut reply = [0u8; 2];
            match self.transport.read_exact(&mut reply, self.config.wake_timeout) {
                Ok(()) if reply == WAKE_REPLY => {
                    debug!(endpoint = self.transport.endpoint(), attempt, "console awake");
                    self.touch();
                    return Ok(());
                }
                Ok(()) => {
                    debug!(attempt, reply = ?reply, "unexpected wake reply");
                }
                Err(err) if err.is_timeout() => {
                    debug!(attempt, "no wake reply");
                }
                Err(err) => return Err(self.transport_fault(err.into())),
            }
        }

        self.awake_until = None;
        warn!(
            endpoint = self.transport.endpoint(),
            attempts, "console did not wake; reconnecting"
        );
        self.reconnect_quietly();
        Err(SessionError::WakeTimeout { attempts })
    }

    /// Send a text command and wait for its acknowledgement.
    ///
    /// An unanswered or rejected command is retried once after a forced
    /// wake-up. If it still fails the link is reconnected and `NoAck` is
    /// returned.
    pub fn send_command(&mut self, command: &str, expect: Expect) -> Result<()> {
        let attempts = self.config.command_retries + 1;
        for attempt in 1..=attempts {
            self.wake_up(attempt > 1)?;
            match self.exchange(command, expect) {
                Ok(true) => {
                    self.touch();
                    return Ok(());
                }
                Ok(false) => {
                    debug!(command, attempt, "command not acknowledged");
                }
                Err(err) => return Err(err),
            }
        }

        warn!(command, attempts, "console did not acknowledge command; reconnecting");
        self.awake_until = None;
        self.reconnect_quietly();
        Err(SessionError::NoAck {
            command: command.to_string(),
        })
    }

    fn exchange(&mut self, command: &str, expect: Expect) -> Result<bool> {
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(LF);
        let sent = self
            .transport
            .discard_input()
            .and_then(|()| self.transport.write_all(&line));
        self.link(sent)?;

        match expect {
            Expect::Ack => self.await_ack(self.config.ack_timeout),
            Expect::Ok => {
                let mut reply = [0u8; 6];
                match self.transport.read_exact(&mut reply, self.config.ack_timeout) {
                    Ok(()) => Ok(reply.as_slice() == OK_REPLY),
                    Err(err) if err.is_timeout() => Ok(false),
                    Err(err) => Err(self.transport_fault(err.into())),
                }
            }
        }
    }

    /// Wait for an ACK byte. NAK, CANCEL, other bytes or silence give `false`.
    ///
    /// Stray LF/CR (a late wake reply) is skipped.
    pub fn await_ack(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let byte = match self.transport.read_byte(remaining) {
                Ok(byte) => byte,
                Err(err) if err.is_timeout() => return Ok(false),
                Err(err) => return Err(self.transport_fault(err.into())),
            };
            match byte {
                ACK => return Ok(true),
                LF | CR => continue,
                NAK | CANCEL => {
                    debug!(reply = control_name(byte), "command rejected");
                    return Ok(false);
                }
                other => {
                    debug!(reply = other, "unexpected reply instead of ACK");
                    return Ok(false);
                }
            }
        }
    }

    /// Write raw bytes (binary payloads).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.config.shutdown.check()?;
        let written = self.transport.write_all(bytes);
        self.link(written)
    }

    /// Write a single control byte (ACK, NAK, ESC).
    pub fn write_control(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Fill `buf`. A timeout comes back as a transport error without
    /// reconnecting; any other link failure reconnects first.
    pub fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let read = self.transport.read_exact(buf, timeout);
        self.link(read)
    }

    pub fn discard_input(&mut self) -> Result<()> {
        let discarded = self.transport.discard_input();
        self.link(discarded)
    }

    /// Close and reopen the link. The console must be woken again.
    pub fn reconnect(&mut self) -> Result<()> {
        self.awake_until = None;
        self.transport.reconnect()?;
        info!(endpoint = self.transport.endpoint(), "reconnected to console");
        Ok(())
    }

    fn reconnect_quietly(&mut self) {
        if let Err(err) = self.reconnect() {
            warn!(endpoint = self.transport.endpoint(), error = %err, "reconnect failed");
        }
    }

    /// Pass an I/O result through, reconnecting when the link failed.
    /// Timeouts are left to the caller.
    fn link<R>(&mut self, result: wxconsole_transport::Result<R>) -> Result<R> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_timeout() => Err(err.into()),
            Err(err) => Err(self.transport_fault(err.into())),
        }
    }

    /// Reconnect after a link failure and hand the error back.
    fn transport_fault(&mut self, err: SessionError) -> SessionError {
        if matches!(err, SessionError::Transport(_)) {
            warn!(endpoint = self.transport.endpoint(), error = %err, "transport fault");
            self.reconnect_quietly();
        }
        err
    }

    /// Firmware version string (`NVER`).
    pub fn firmware_version(&mut self) -> Result<String> {
        self.send_command("NVER", Expect::Ok)?;
        let line = self.read_text_line(self.config.ack_timeout)?;
        Ok(line)
    }

    fn read_text_line(&mut self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let mut line = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let read = self.transport.read_byte(remaining);
            let byte = self.link(read)?;
            match byte {
                LF => continue,
                CR => break,
                other => line.push(other),
            }
            if line.len() > MAX_TEXT_LINE {
                return Err(SessionError::ProtocolError(format!(
                    "text reply longer than {MAX_TEXT_LINE} bytes"
                )));
            }
        }
        String::from_utf8(line)
            .map(|text| text.trim().to_string())
            .map_err(|_| SessionError::ProtocolError("text reply is not UTF-8".into()))
    }

    /// Read the console clock (`GETTIME`).
    pub fn console_time(&mut self) -> Result<NaiveDateTime> {
        self.send_command("GETTIME", Expect::Ack)?;
        let mut frame = [0u8; CONSOLE_TIME_FRAME_LEN];
        self.read_exact(&mut frame, self.config.ack_timeout)?;
        Ok(decode_console_time(&frame)?)
    }

    /// Set the console clock (`SETTIME`).
    pub fn set_console_time(&mut self, at: NaiveDateTime) -> Result<()> {
        let frame = encode_console_time(at)?;
        self.send_command("SETTIME", Expect::Ack)?;
        self.write_bytes(&frame)?;
        if !self.await_ack(self.config.ack_timeout)? {
            return Err(SessionError::NoAck {
                command: "SETTIME".into(),
            });
        }
        info!(time = %at, "console clock set");
        Ok(())
    }

    /// Correct the console clock when it is more than `max_drift` away
    /// from `reference`. Returns the drift that was corrected, if any.
    pub fn sync_clock(&mut self, reference: NaiveDateTime, max_drift: Duration) -> Result<Option<TimeDelta>> {
        let console = self.console_time()?;
        let drift = reference - console;
        let limit = TimeDelta::from_std(max_drift).unwrap_or(TimeDelta::MAX);
        if drift.abs() <= limit {
            debug!(drift_secs = drift.num_seconds(), "console clock within tolerance");
            return Ok(None);
        }
        warn!(
            console = %console,
            reference = %reference,
            drift_secs = drift.num_seconds(),
            "console clock drifted; correcting"
        );
        self.set_console_time(reference)?;
        Ok(Some(drift))
    }

    /// Archive interval in minutes, read from console EEPROM.
    pub fn archive_interval(&mut self) -> Result<u16> {
        self.send_command("EEBRD 2D 01", Expect::Ack)?;
        let mut reply = [0u8; 3];
        self.read_exact(&mut reply, self.config.ack_timeout)?;
        if !crc_is_valid(&reply) {
            return Err(wxconsole_frame::FrameError::BadCrc.into());
        }
        match reply[0] {
            0 => Err(SessionError::ProtocolError("archive interval of zero".into())),
            minutes => Ok(u16::from(minutes)),
        }
    }
}
