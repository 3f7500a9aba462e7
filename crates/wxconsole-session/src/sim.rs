//! Scriptable in-process console.
//!
//! [`SimulatedConsole`] implements [`Transport`] and answers the way a
//! console does: wake replies, ACK/OK, LOOP streams, DMPAFT paging and the
//! clock commands. Replies to commands are available immediately; streamed
//! frames (LOOP frames, archive pages) arrive one chunk at a time, so a
//! flush only drops what has already arrived. Reads never block: when
//! nothing is pending they fail with a timeout at once.
//!
//! Clones share state, so a test keeps one handle for scripting and
//! inspection while the session owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use wxconsole_frame::control::{CR, LF};
use wxconsole_frame::{
    append_crc, crc_is_valid, decode_console_time, encode_archive_page, encode_console_time,
    encode_page_header, ArchiveFormat, ArchiveRecordBuilder, LoopFrameBuilder, LoopKind, PageHeader,
    ACK, ARCHIVE_RECORD_LEN, CANCEL, CONSOLE_TIME_FRAME_LEN, DATETIME_FRAME_LEN, ESC, NAK, OK_REPLY,
    RECORDS_PER_PAGE, WAKE_REPLY,
};
use wxconsole_transport::{ShutdownSignal, Transport, TransportError};

type Slot = [u8; ARCHIVE_RECORD_LEN];

/// What the simulated console has seen and done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub connects: u32,
    /// Wake newlines received (answered or not).
    pub wake_requests: u32,
    /// Wake newlines answered.
    pub wakes: u32,
    /// Text commands received, in order.
    pub commands: Vec<String>,
    /// Archive pages transmitted (resends included).
    pub pages_sent: u32,
    pub naks_received: u32,
    pub escapes_received: u32,
    /// LOOP streams cancelled by a newline.
    pub loop_cancels: u32,
}

#[derive(Debug)]
enum Mode {
    Idle,
    DumpDate(Vec<u8>),
    Dumping {
        first_page: usize,
        pages: usize,
        offset: usize,
        /// Page currently on the wire (index into this dump).
        current: Option<usize>,
    },
    SetTime(Vec<u8>),
}

#[derive(Debug)]
struct State {
    connected: bool,
    unreachable: bool,
    link_dropped: bool,
    shutdown: Option<ShutdownSignal>,
    input: VecDeque<u8>,
    pending: VecDeque<Vec<u8>>,
    line: Vec<u8>,
    mode: Mode,
    mute_wakes: u32,
    drop_replies: u32,
    scripted_loops: Option<VecDeque<Vec<u8>>>,
    live: LoopFrameBuilder,
    archive: Vec<Slot>,
    header_override: Option<PageHeader>,
    page_corruptions: HashMap<usize, u32>,
    clock: NaiveDateTime,
    archive_interval: u8,
    firmware: String,
    counters: SimCounters,
}

impl State {
    fn reply(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    fn stream(&mut self, chunk: Vec<u8>) {
        self.pending.push_back(chunk);
    }

    fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.receive_byte(byte);
        }
    }

    fn receive_byte(&mut self, byte: u8) {
        match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Idle => self.receive_text(byte),
            Mode::DumpDate(mut frame) => {
                frame.push(byte);
                if frame.len() == DATETIME_FRAME_LEN {
                    self.start_dump(&frame);
                } else {
                    self.mode = Mode::DumpDate(frame);
                }
            }
            Mode::SetTime(mut frame) => {
                frame.push(byte);
                if frame.len() == CONSOLE_TIME_FRAME_LEN {
                    match decode_console_time(&frame) {
                        Ok(at) => {
                            self.clock = at;
                            self.reply(&[ACK]);
                        }
                        Err(_) => self.reply(&[NAK]),
                    }
                } else {
                    self.mode = Mode::SetTime(frame);
                }
            }
            Mode::Dumping {
                first_page,
                pages,
                offset,
                current,
            } => self.receive_dump_control(byte, first_page, pages, offset, current),
        }
    }

    fn receive_text(&mut self, byte: u8) {
        match byte {
            LF => {
                let line = std::mem::take(&mut self.line);
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    self.wake();
                } else {
                    self.command(&text);
                }
            }
            CR => {}
            ACK | NAK | ESC => {}
            other => self.line.push(other),
        }
    }

    fn wake(&mut self) {
        self.counters.wake_requests += 1;
        if !self.pending.is_empty() {
            self.pending.clear();
            self.counters.loop_cancels += 1;
        }
        if self.mute_wakes > 0 {
            self.mute_wakes -= 1;
            return;
        }
        self.counters.wakes += 1;
        self.reply(&WAKE_REPLY);
    }

    fn command(&mut self, text: &str) {
        self.counters.commands.push(text.to_string());
        if self.drop_replies > 0 {
            self.drop_replies -= 1;
            return;
        }

        let mut words = text.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("LOOP"), Some(count), None) => self.start_loop(LoopKind::Loop, count),
            (Some("LPS"), Some("2"), Some(count)) => self.start_loop(LoopKind::Loop2, count),
            (Some("DMPAFT"), None, None) => {
                self.reply(&[ACK]);
                self.mode = Mode::DumpDate(Vec::new());
            }
            (Some("NVER"), None, None) => {
                self.reply(OK_REPLY);
                let line = format!("{}\n\r", self.firmware);
                self.reply(line.as_bytes());
            }
            (Some("GETTIME"), None, None) => {
                self.reply(&[ACK]);
                if let Ok(frame) = encode_console_time(self.clock) {
                    self.reply(&frame);
                }
            }
            (Some("SETTIME"), None, None) => {
                self.reply(&[ACK]);
                self.mode = Mode::SetTime(Vec::new());
            }
            (Some("EEBRD"), Some("2D"), Some("01")) => {
                self.reply(&[ACK]);
                let mut data = vec![self.archive_interval];
                append_crc(&mut data);
                self.reply(&data);
            }
            (Some("TEST"), None, None) => self.reply(&[ACK]),
            _ => self.reply(&[NAK]),
        }
    }

    fn start_loop(&mut self, kind: LoopKind, count: &str) {
        let Ok(count) = count.parse::<usize>() else {
            self.reply(&[NAK]);
            return;
        };
        self.reply(&[ACK]);
        for _ in 0..count {
            let frame = match self.scripted_loops.as_mut() {
                Some(script) => match script.pop_front() {
                    Some(frame) => frame,
                    None => break,
                },
                None => {
                    let builder = if self.live.kind() == kind {
                        self.live.clone()
                    } else {
                        LoopFrameBuilder::new(kind)
                    };
                    builder.build().to_vec()
                }
            };
            self.stream(frame);
        }
    }

    fn start_dump(&mut self, frame: &[u8]) {
        if !crc_is_valid(frame) {
            self.reply(&[CANCEL]);
            return;
        }
        let date = u16::from_le_bytes([frame[0], frame[1]]);
        let time = u16::from_le_bytes([frame[2], frame[3]]);
        let since = wxconsole_frame::datetime::unpack_timestamp(date, time).ok().flatten();

        let first = since
            .and_then(|since| {
                self.archive.iter().position(|slot| {
                    slot_timestamp(slot).is_some_and(|ts| ts > since)
                })
            })
            .unwrap_or(if since.is_some() { self.archive.len() } else { 0 });

        let computed = if first >= self.archive.len() {
            PageHeader { pages: 0, offset: 0 }
        } else {
            let first_page = first / RECORDS_PER_PAGE;
            let total_pages = self.archive.len().div_ceil(RECORDS_PER_PAGE);
            PageHeader {
                pages: (total_pages - first_page) as u16,
                offset: (first % RECORDS_PER_PAGE) as u16,
            }
        };
        let header = self.header_override.take().unwrap_or(computed);
        let first_page = first.min(self.archive.len()) / RECORDS_PER_PAGE;

        self.reply(&[ACK]);
        self.reply(&encode_page_header(header));
        if header.pages > 0 {
            self.mode = Mode::Dumping {
                first_page,
                pages: usize::from(header.pages),
                offset: usize::from(header.offset),
                current: None,
            };
        }
    }

    fn receive_dump_control(
        &mut self,
        byte: u8,
        first_page: usize,
        pages: usize,
        offset: usize,
        current: Option<usize>,
    ) {
        let next = match byte {
            ACK => current.map_or(0, |page| page + 1),
            NAK => {
                self.counters.naks_received += 1;
                current.unwrap_or(0)
            }
            ESC => {
                self.counters.escapes_received += 1;
                self.pending.clear();
                return;
            }
            _ => {
                self.mode = Mode::Dumping {
                    first_page,
                    pages,
                    offset,
                    current,
                };
                return;
            }
        };
        if next >= pages {
            // closing ACK
            return;
        }
        let page = self.page(first_page + next, next);
        self.stream(page);
        self.counters.pages_sent += 1;
        self.mode = Mode::Dumping {
            first_page,
            pages,
            offset,
            current: Some(next),
        };
    }

    fn page(&mut self, logger_page: usize, sequence: usize) -> Vec<u8> {
        let start = logger_page * RECORDS_PER_PAGE;
        let slots: Vec<Slot> = self
            .archive
            .iter()
            .skip(start)
            .take(RECORDS_PER_PAGE)
            .copied()
            .collect();
        let mut page = encode_archive_page(sequence as u8, &slots).to_vec();
        if let Some(remaining) = self.page_corruptions.get_mut(&sequence) {
            if *remaining > 0 {
                *remaining -= 1;
                page[10] ^= 0x55;
            }
        }
        page
    }

    fn check_link(&self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected("simulated console".into()));
        }
        if self.link_dropped {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        if let Some(signal) = &self.shutdown {
            signal.check()?;
        }
        self.check_link()?;
        let expected = buf.len();
        for (received, slot) in buf.iter_mut().enumerate() {
            if self.input.is_empty() {
                if let Some(chunk) = self.pending.pop_front() {
                    self.input.extend(chunk);
                }
            }
            match self.input.pop_front() {
                Some(byte) => *slot = byte,
                None => {
                    return Err(TransportError::Timeout {
                        expected,
                        received,
                        timeout,
                    })
                }
            }
        }
        Ok(())
    }
}

fn slot_timestamp(slot: &Slot) -> Option<NaiveDateTime> {
    let date = u16::from_le_bytes([slot[0], slot[1]]);
    let time = u16::from_le_bytes([slot[2], slot[3]]);
    wxconsole_frame::datetime::unpack_timestamp(date, time)
        .ok()
        .flatten()
}

/// An in-process console for tests and `--simulate` runs.
#[derive(Debug, Clone)]
pub struct SimulatedConsole {
    state: Arc<Mutex<State>>,
}

impl Default for SimulatedConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedConsole {
    pub fn new() -> Self {
        let clock = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            state: Arc::new(Mutex::new(State {
                connected: false,
                unreachable: false,
                link_dropped: false,
                shutdown: None,
                input: VecDeque::new(),
                pending: VecDeque::new(),
                line: Vec::new(),
                mode: Mode::Idle,
                mute_wakes: 0,
                drop_replies: 0,
                scripted_loops: None,
                live: LoopFrameBuilder::new(LoopKind::Loop),
                archive: Vec::new(),
                header_override: None,
                page_corruptions: HashMap::new(),
                clock,
                archive_interval: 5,
                firmware: "1.90".into(),
                counters: SimCounters::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Observe `signal` on every read.
    pub fn with_shutdown(self, signal: ShutdownSignal) -> Self {
        self.state().shutdown = Some(signal);
        self
    }

    /// Ignore the next `count` wake newlines.
    pub fn mute_wakes(&self, count: u32) {
        self.state().mute_wakes = count;
    }

    /// Leave the next `count` text commands unanswered.
    pub fn drop_replies(&self, count: u32) {
        self.state().drop_replies = count;
    }

    /// Refuse connections (the console is unplugged).
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state();
        state.unreachable = unreachable;
        if unreachable {
            state.connected = false;
        }
    }

    /// Break the link without closing the handle: every I/O call fails
    /// with [`TransportError::Closed`] until the transport reconnects.
    pub fn drop_link(&self) {
        self.state().link_dropped = true;
    }

    /// Frame served for LOOP requests when no script is set.
    pub fn set_live(&self, frame: LoopFrameBuilder) {
        self.state().live = frame;
    }

    /// Serve exactly these raw frames to LOOP requests, then fall silent.
    pub fn script_loop_frames(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.state().scripted_loops = Some(frames.into_iter().collect());
    }

    /// Append record slots to the logger, oldest first.
    pub fn push_archive(&self, slots: impl IntoIterator<Item = Slot>) {
        self.state().archive.extend(slots);
    }

    /// Append one rev B record per timestamp.
    pub fn push_archive_times(&self, times: impl IntoIterator<Item = NaiveDateTime>) {
        let slots: Vec<Slot> = times
            .into_iter()
            .map(|ts| {
                ArchiveRecordBuilder::new(ArchiveFormat::VantageRevB, ts)
                    .temperature(60.0, 61.0, 59.0)
                    .humidity(50)
                    .build()
            })
            .collect();
        self.push_archive(slots);
    }

    /// Answer the next DMPAFT with this header instead of the computed one.
    pub fn override_page_header(&self, header: PageHeader) {
        self.state().header_override = Some(header);
    }

    /// Corrupt the first `times` transmissions of dump page `page`.
    pub fn corrupt_page(&self, page: usize, times: u32) {
        self.state().page_corruptions.insert(page, times);
    }

    pub fn set_clock(&self, at: NaiveDateTime) {
        self.state().clock = at;
    }

    pub fn clock(&self) -> NaiveDateTime {
        self.state().clock
    }

    pub fn set_archive_interval(&self, minutes: u8) {
        self.state().archive_interval = minutes;
    }

    pub fn counters(&self) -> SimCounters {
        self.state().counters.clone()
    }
}

impl Transport for SimulatedConsole {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(TransportError::ConnectFailed {
                endpoint: "sim".into(),
                attempts: 1,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "console unplugged"),
            });
        }
        state.connected = true;
        state.link_dropped = false;
        state.counters.connects += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.connected = false;
        state.input.clear();
        state.pending.clear();
        state.line.clear();
        state.mode = Mode::Idle;
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        state.check_link()?;
        state.receive(bytes);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        self.state().read(buf, timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.check_link()?;
        state.input.clear();
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn endpoint(&self) -> &str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_wake_and_commands() {
        let mut sim = SimulatedConsole::new();
        sim.connect().unwrap();
        sim.write_all(b"\n").unwrap();
        let mut reply = [0u8; 2];
        sim.read_exact(&mut reply, Duration::ZERO).unwrap();
        assert_eq!(reply, WAKE_REPLY);

        sim.write_all(b"BOGUS\n").unwrap();
        assert_eq!(sim.read_byte(Duration::ZERO).unwrap(), NAK);
        assert_eq!(sim.counters().commands, vec!["BOGUS".to_string()]);
    }

    #[test]
    fn streamed_chunks_survive_a_flush() {
        let mut sim = SimulatedConsole::new();
        sim.connect().unwrap();
        sim.write_all(b"LOOP 2\n").unwrap();
        assert_eq!(sim.read_byte(Duration::ZERO).unwrap(), ACK);

        let mut frame = [0u8; 99];
        sim.read_exact(&mut frame[..10], Duration::ZERO).unwrap();
        sim.discard_input().unwrap();
        sim.read_exact(&mut frame, Duration::ZERO).unwrap();
        assert_eq!(&frame[..3], b"LOO");
        assert!(sim.read_byte(Duration::ZERO).unwrap_err().is_timeout());
    }

    #[test]
    fn reads_fail_when_closed() {
        let mut sim = SimulatedConsole::new();
        assert!(matches!(
            sim.read_byte(Duration::ZERO),
            Err(TransportError::NotConnected(_))
        ));
        sim.set_unreachable(true);
        assert!(sim.connect().is_err());
    }

    #[test]
    fn dropped_link_fails_until_reconnect() {
        let mut sim = SimulatedConsole::new();
        sim.connect().unwrap();
        sim.drop_link();
        assert!(sim.is_connected());
        assert!(matches!(sim.write_all(b"\n"), Err(TransportError::Closed)));
        assert!(matches!(sim.discard_input(), Err(TransportError::Closed)));

        sim.reconnect().unwrap();
        sim.write_all(b"\n").unwrap();
        assert_eq!(sim.read_byte(Duration::ZERO).unwrap(), LF);
        assert_eq!(sim.counters().connects, 2);
    }
}
