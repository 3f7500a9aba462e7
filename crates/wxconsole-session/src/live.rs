//! Live current-conditions polling (LOOP / LOOP2).

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use wxconsole_frame::control::LF;
use wxconsole_frame::{decode_loop, FrameError, LoopKind, LoopRecord, LOOP_FRAME_LEN};
use wxconsole_transport::Transport;

use crate::console::{ConsoleSession, Expect};
use crate::error::{Result, SessionError};

/// Consecutive misaligned frames tolerated before a batch gives up.
const MAX_CONSECUTIVE_MISMATCHES: u32 = 2;

/// Why a LOOP batch stopped before delivering every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopAbort {
    /// No frame arrived within the watchdog.
    Watchdog,
    /// The stream stayed misaligned after a flush.
    Resync,
    /// The link failed; the session has reconnected.
    Transport(String),
    Shutdown,
}

/// Summary of a finished (or dropped) batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    pub requested: u16,
    pub delivered: u16,
    /// Frames dropped for a bad CRC.
    pub dropped: u16,
    /// Header mismatches that triggered an input flush.
    pub resyncs: u16,
    pub aborted: Option<LoopAbort>,
}

/// Ask for `count` LOOP or LOOP2 frames.
///
/// The console starts streaming after acknowledging the command; frames are
/// read and decoded lazily by the returned iterator.
pub fn request_loop<T: Transport>(
    session: &mut ConsoleSession<T>,
    kind: LoopKind,
    count: u16,
) -> Result<LoopBatch<'_, T>> {
    if count > 0 {
        session.send_command(&kind.command(count), Expect::Ack)?;
    }
    Ok(LoopBatch {
        session,
        kind,
        remaining: count,
        mismatches: 0,
        outcome: LoopOutcome {
            requested: count,
            ..LoopOutcome::default()
        },
        finished: count == 0,
    })
}

/// Lazily decoded frames of one LOOP request.
///
/// Dropping a batch before it is exhausted cancels the stream on the
/// console.
pub struct LoopBatch<'s, T: Transport> {
    session: &'s mut ConsoleSession<T>,
    kind: LoopKind,
    remaining: u16,
    mismatches: u32,
    outcome: LoopOutcome,
    finished: bool,
}

impl<T: Transport> LoopBatch<'_, T> {
    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    /// Counts so far, and the abort reason if the batch stopped early.
    pub fn outcome(&self) -> &LoopOutcome {
        &self.outcome
    }

    fn abort(&mut self, reason: LoopAbort) {
        warn!(
            reason = ?reason,
            delivered = self.outcome.delivered,
            requested = self.outcome.requested,
            "LOOP batch aborted"
        );
        self.outcome.aborted = Some(reason);
        self.finished = true;
    }

    fn cancel(&mut self) {
        if let Err(err) = self
            .session
            .write_bytes(&[LF])
            .and_then(|()| self.session.discard_input())
        {
            debug!(error = %err, "could not cancel LOOP stream");
        }
    }
}

impl<T: Transport> Iterator for LoopBatch<'_, T> {
    type Item = LoopRecord;

    fn next(&mut self) -> Option<LoopRecord> {
        loop {
            if self.finished || self.remaining == 0 {
                self.finished = true;
                return None;
            }
            self.remaining -= 1;

            let mut frame = [0u8; LOOP_FRAME_LEN];
            let watchdog = self.session.config().loop_watchdog;
            if let Err(err) = self.session.read_exact(&mut frame, watchdog) {
                let reason = match &err {
                    SessionError::Shutdown => LoopAbort::Shutdown,
                    err if err.is_timeout() => LoopAbort::Watchdog,
                    other => LoopAbort::Transport(other.to_string()),
                };
                self.abort(reason);
                return None;
            }
            self.session.touch();

            match decode_loop(&frame) {
                Ok(record) => {
                    self.mismatches = 0;
                    if record.kind != self.kind {
                        debug!(expected = ?self.kind, got = ?record.kind, "LOOP frame of the other kind");
                    }
                    self.outcome.delivered += 1;
                    return Some(record);
                }
                Err(FrameError::BadHeader | FrameError::BadPacketType(_)) => {
                    self.mismatches += 1;
                    self.outcome.resyncs += 1;
                    if self.mismatches >= MAX_CONSECUTIVE_MISMATCHES {
                        self.abort(LoopAbort::Resync);
                        return None;
                    }
                    debug!("LOOP frame misaligned; flushing input");
                    if let Err(err) = self.session.discard_input() {
                        debug!(error = %err, "flush failed");
                    }
                }
                Err(err) => {
                    self.mismatches = 0;
                    self.outcome.dropped += 1;
                    debug!(error = %err, "dropping LOOP frame");
                }
            }
        }
    }
}

impl<T: Transport> Drop for LoopBatch<'_, T> {
    fn drop(&mut self) {
        let unfinished = self.remaining > 0 || self.outcome.aborted.is_some();
        if unfinished && !matches!(self.outcome.aborted, Some(LoopAbort::Transport(_) | LoopAbort::Shutdown)) {
            self.cancel();
        }
    }
}

/// The day's strongest gust seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Gust {
    pub speed_mph: f64,
    pub dir_deg: Option<u16>,
    pub at: NaiveDateTime,
}

/// Running daily peak gust built from live frames.
///
/// Instantaneous samples can miss the real peak between two polls; LOOP2
/// frames carry the console's own 10-minute gust, which corrects it.
#[derive(Debug, Clone, Default)]
pub struct GustTracker {
    peak: Option<Gust>,
}

impl GustTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one live frame in. Returns `true` when the peak was raised.
    pub fn observe(&mut self, record: &LoopRecord, at: NaiveDateTime) -> bool {
        let mut raised = false;
        if let Some(speed) = record.wind_speed_mph {
            raised |= self.offer(speed, record.wind_dir_deg, at);
        }
        if let Some((speed, dir)) = record.gust_10min() {
            raised |= self.offer(speed, dir, at);
        }
        raised
    }

    fn offer(&mut self, speed_mph: f64, dir_deg: Option<u16>, at: NaiveDateTime) -> bool {
        if self.peak.as_ref().is_some_and(|peak| peak.speed_mph >= speed_mph) {
            return false;
        }
        self.peak = Some(Gust { speed_mph, dir_deg, at });
        true
    }

    pub fn peak(&self) -> Option<&Gust> {
        self.peak.as_ref()
    }

    /// Start a new day.
    pub fn reset(&mut self) {
        self.peak = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use wxconsole_frame::LoopFrameBuilder;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn gust_tracker_keeps_daily_peak() {
        let mut gusts = GustTracker::new();
        let calm = decode_loop(&LoopFrameBuilder::new(LoopKind::Loop).wind(5, 90).build()).unwrap();
        let windy = decode_loop(&LoopFrameBuilder::new(LoopKind::Loop).wind(18, 270).build()).unwrap();

        assert!(gusts.observe(&calm, at(8, 0)));
        assert!(gusts.observe(&windy, at(9, 0)));
        assert!(!gusts.observe(&calm, at(10, 0)));
        let peak = gusts.peak().unwrap();
        assert_eq!(peak.speed_mph, 18.0);
        assert_eq!(peak.dir_deg, Some(270));
        assert_eq!(peak.at, at(9, 0));

        gusts.reset();
        assert!(gusts.peak().is_none());
    }

    #[test]
    fn loop2_gust_corrects_missed_peak() {
        let mut gusts = GustTracker::new();
        let sampled = decode_loop(&LoopFrameBuilder::new(LoopKind::Loop2).wind(10, 180).build()).unwrap();
        gusts.observe(&sampled, at(12, 0));

        let with_gust = decode_loop(
            &LoopFrameBuilder::new(LoopKind::Loop2)
                .wind(8, 180)
                .gust_10min(31, 200)
                .build(),
        )
        .unwrap();
        assert!(gusts.observe(&with_gust, at(12, 5)));
        assert_eq!(gusts.peak().unwrap().speed_mph, 31.0);
        assert_eq!(gusts.peak().unwrap().dir_deg, Some(200));
    }
}
