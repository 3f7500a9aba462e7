//! Historic archive download (DMPAFT).
//!
//! ```text
//! host                      console
//!  DMPAFT\n        ───────▶
//!                  ◀───────  ACK
//!  date/time+CRC   ───────▶
//!                  ◀───────  ACK, pages/offset+CRC
//!  ACK             ───────▶
//!                  ◀───────  page 0           (NAK: resend, ESC: abort)
//!  ACK             ───────▶
//!                  ◀───────  page 1 …
//!  ACK             ───────▶                   (closing)
//! ```

use std::collections::VecDeque;
use std::fmt;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use wxconsole_frame::{
    decode_archive_record, decode_page_header, encode_dmpaft_request, ArchiveFormat, ArchivePage,
    ArchiveRecord, PageHeader, ACK, ARCHIVE_PAGE_LEN, DATETIME_FRAME_LEN, ESC, NAK, RECORDS_PER_PAGE,
    WHOLE_LOGGER_PAGES,
};
use wxconsole_transport::Transport;

use crate::console::{ConsoleSession, Expect};
use crate::error::{FaultClass, Result, SessionError};

/// Archive interval assumed for layouts that do not store their own.
pub const DEFAULT_INTERVAL_MINUTES: u16 = 5;

/// Reported after every validated page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Pages received so far (1-based).
    pub page: u16,
    pub pages: u16,
    /// Records accepted so far.
    pub records: usize,
}

type ProgressFn = Box<dyn FnMut(DownloadProgress) + Send>;

/// Knobs for one archive download.
pub struct DownloadOptions {
    /// Decode every slot with this layout instead of detecting it.
    pub format: Option<ArchiveFormat>,
    /// Interval for layouts that do not carry one.
    pub interval_minutes: u16,
    progress: Option<ProgressFn>,
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_interval(mut self, minutes: u16) -> Self {
        self.interval_minutes = minutes;
        self
    }

    pub fn on_progress(mut self, progress: impl FnMut(DownloadProgress) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: None,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            progress: None,
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("format", &self.format)
            .field("interval_minutes", &self.interval_minutes)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Start downloading every archive record newer than `since`.
///
/// Negotiation (command, date frame, page header) happens here; pages are
/// then fetched lazily as the returned iterator is consumed.
pub fn download_since<T: Transport>(
    session: &mut ConsoleSession<T>,
    since: NaiveDateTime,
    options: DownloadOptions,
) -> Result<ArchiveDownload<'_, T>> {
    let request = encode_dmpaft_request(since)?;
    session.send_command("DMPAFT", Expect::Ack)?;

    session.write_bytes(&request)?;
    let timeout = session.config().dmpaft_ack_timeout;
    if !session.await_ack(timeout)? {
        warn!(since = %since, "console rejected DMPAFT date");
        return Err(SessionError::NoAck {
            command: "DMPAFT date".into(),
        });
    }

    let header = match read_page_header(session) {
        Ok(header) => header,
        Err(err) => {
            // a dropped link has already been reconnected; there is no dump to abort
            if err.fault() != FaultClass::Transport || err.is_timeout() {
                abort_dump(session);
            }
            return Err(err);
        }
    };
    if header.pages >= WHOLE_LOGGER_PAGES {
        warn!(
            pages = header.pages,
            since = %since,
            "console is replaying its whole logger; check the console clock"
        );
    }
    info!(pages = header.pages, offset = header.offset, since = %since, "archive download starting");
    session.touch();

    Ok(ArchiveDownload {
        session,
        since,
        header,
        options,
        next_page: 0,
        last: None,
        accepted: 0,
        pending: VecDeque::new(),
        finished: header.pages == 0,
    })
}

fn read_page_header<T: Transport>(session: &mut ConsoleSession<T>) -> Result<PageHeader> {
    let mut frame = [0u8; DATETIME_FRAME_LEN];
    let timeout = session.config().page_timeout;
    session.read_exact(&mut frame, timeout)?;
    let header = decode_page_header(&frame)
        .map_err(|err| SessionError::ProtocolError(format!("page header: {err}")))?;
    if usize::from(header.offset) >= RECORDS_PER_PAGE {
        return Err(SessionError::ProtocolError(format!(
            "page header offset {} out of range",
            header.offset
        )));
    }
    Ok(header)
}

fn abort_dump<T: Transport>(session: &mut ConsoleSession<T>) {
    if let Err(err) = session
        .write_control(ESC)
        .and_then(|()| session.discard_input())
    {
        debug!(error = %err, "could not abort archive dump");
    }
}

/// Archive records newer than the requested time, oldest first.
///
/// Yields `Err` at most once, then ends. Dropping the iterator before it
/// ends aborts the dump on the console.
pub struct ArchiveDownload<'s, T: Transport> {
    session: &'s mut ConsoleSession<T>,
    since: NaiveDateTime,
    header: PageHeader,
    options: DownloadOptions,
    next_page: u16,
    last: Option<NaiveDateTime>,
    accepted: usize,
    pending: VecDeque<ArchiveRecord>,
    finished: bool,
}

impl<T: Transport> ArchiveDownload<'_, T> {
    /// Page count and first-slot offset announced by the console.
    pub fn header(&self) -> PageHeader {
        self.header
    }

    /// Records accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    fn fetch_page(&mut self, index: u16) -> Result<ArchivePage> {
        let attempts = self.session.config().page_retries.max(1);
        let timeout = self.session.config().page_timeout;
        let backoff = self.session.config().page_retry_delay;
        self.session.write_control(ACK)?;

        for attempt in 1..=attempts {
            self.session.shutdown().check()?;
            let mut buf = [0u8; ARCHIVE_PAGE_LEN];
            match self.session.read_exact(&mut buf, timeout) {
                Ok(()) => match ArchivePage::from_bytes(buf) {
                    Ok(page) => {
                        self.session.touch();
                        return Ok(page);
                    }
                    Err(err) => debug!(page = index, attempt, error = %err, "archive page invalid"),
                },
                Err(err) if err.is_timeout() => debug!(page = index, attempt, "archive page timed out"),
                Err(err) => return Err(err),
            }
            if attempt < attempts {
                self.session.shutdown().sleep(backoff)?;
                self.session.discard_input()?;
                self.session.write_control(NAK)?;
            }
        }

        warn!(page = index, attempts, "archive page retries exhausted; aborting dump");
        abort_dump(self.session);
        Err(SessionError::PageRetriesExhausted { page: index, attempts })
    }

    fn accept_page(&mut self, index: u16, page: &ArchivePage) {
        let first = if index == 0 { usize::from(self.header.offset) } else { 0 };

        for slot in page.slots_from(first) {
            let format = match self.options.format {
                Some(format) => format,
                None => match ArchiveFormat::detect(slot) {
                    Ok(format) => format,
                    Err(err) => {
                        warn!(page = index, error = %err, "skipping archive slot");
                        continue;
                    }
                },
            };
            let record = match decode_archive_record(slot, format, self.options.interval_minutes) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    warn!(page = index, error = %err, "skipping archive slot");
                    continue;
                }
            };
            if record.timestamp <= self.since || self.last.is_some_and(|last| record.timestamp <= last) {
                debug!(timestamp = %record.timestamp, "discarding stale archive record");
                continue;
            }
            self.last = Some(record.timestamp);
            self.accepted += 1;
            self.pending.push_back(record);
        }

        let progress = DownloadProgress {
            page: index + 1,
            pages: self.header.pages,
            records: self.accepted,
        };
        if let Some(report) = self.options.progress.as_mut() {
            report(progress);
        }
    }

    fn step(&mut self) -> Result<()> {
        let index = self.next_page;
        let page = self.fetch_page(index)?;
        self.next_page += 1;
        self.accept_page(index, &page);

        if self.next_page >= self.header.pages {
            self.session.write_control(ACK)?;
            self.finished = true;
            info!(
                pages = self.header.pages,
                records = self.accepted,
                "archive download complete"
            );
        }
        Ok(())
    }
}

impl<T: Transport> Iterator for ArchiveDownload<'_, T> {
    type Item = Result<ArchiveRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.step() {
                self.finished = true;
                return Some(Err(err));
            }
        }
    }
}

impl<T: Transport> Drop for ArchiveDownload<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(page = self.next_page, "archive download dropped early");
            abort_dump(self.session);
        }
    }
}
