//! Packed date/time frames: DMPAFT requests, page-count replies, and the
//! console clock.
//!
//! ```text
//! packed date = day + month * 32 + (year - 2000) * 512     (LE16)
//! packed time = hour * 100 + minute                         (LE16)
//! ```

use bytes::{Buf, BufMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::control::{CONSOLE_TIME_FRAME_LEN, DATETIME_FRAME_LEN};
use crate::crc::{append_crc, crc_is_valid};
use crate::error::{FrameError, Result};

/// Reply to a DMPAFT date/time frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Pages the console is about to send.
    pub pages: u16,
    /// First valid record slot in the first page.
    pub offset: u16,
}

/// Pack a calendar date.
pub fn pack_date(date: NaiveDate) -> Result<u16> {
    let year = date.year();
    if !(2000..=2127).contains(&year) {
        return Err(FrameError::TimestampOutOfRange(date.to_string()));
    }
    Ok(date.day() as u16 + date.month() as u16 * 32 + (year - 2000) as u16 * 512)
}

/// Pack a time of day (minute resolution).
pub fn pack_time(time: NaiveTime) -> u16 {
    time.hour() as u16 * 100 + time.minute() as u16
}

/// Unpack an archive timestamp. Blank (never written) slots give `Ok(None)`.
pub fn unpack_timestamp(date: u16, time: u16) -> Result<Option<NaiveDateTime>> {
    if date == u16::MAX || date == 0 {
        return Ok(None);
    }
    let day = u32::from(date & 0x1F);
    let month = u32::from((date >> 5) & 0x0F);
    let year = i32::from(date >> 9) + 2000;
    let hour = u32::from(time / 100);
    let minute = u32::from(time % 100);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .map(Some)
        .ok_or(FrameError::InvalidTimestamp { date, time })
}

/// Build the 6-byte frame that follows the DMPAFT command.
pub fn encode_dmpaft_request(since: NaiveDateTime) -> Result<[u8; DATETIME_FRAME_LEN]> {
    let mut buf = Vec::with_capacity(DATETIME_FRAME_LEN);
    buf.put_u16_le(pack_date(since.date())?);
    buf.put_u16_le(pack_time(since.time()));
    append_crc(&mut buf);

    let mut frame = [0u8; DATETIME_FRAME_LEN];
    frame.copy_from_slice(&buf);
    Ok(frame)
}

/// Parse the page-count reply that precedes archive pages.
pub fn decode_page_header(frame: &[u8]) -> Result<PageHeader> {
    if frame.len() != DATETIME_FRAME_LEN {
        return Err(FrameError::BadLength {
            expected: DATETIME_FRAME_LEN,
            actual: frame.len(),
        });
    }
    if !crc_is_valid(frame) {
        return Err(FrameError::BadCrc);
    }
    let mut buf = &frame[..4];
    Ok(PageHeader {
        pages: buf.get_u16_le(),
        offset: buf.get_u16_le(),
    })
}

/// Build a page-count reply (console side; used by the simulator and tests).
pub fn encode_page_header(header: PageHeader) -> [u8; DATETIME_FRAME_LEN] {
    let mut buf = Vec::with_capacity(DATETIME_FRAME_LEN);
    buf.put_u16_le(header.pages);
    buf.put_u16_le(header.offset);
    append_crc(&mut buf);

    let mut frame = [0u8; DATETIME_FRAME_LEN];
    frame.copy_from_slice(&buf);
    frame
}

/// Parse a GETTIME reply: sec, min, hour, day, month, year - 1900, CRC.
pub fn decode_console_time(frame: &[u8]) -> Result<NaiveDateTime> {
    if frame.len() != CONSOLE_TIME_FRAME_LEN {
        return Err(FrameError::BadLength {
            expected: CONSOLE_TIME_FRAME_LEN,
            actual: frame.len(),
        });
    }
    if !crc_is_valid(frame) {
        return Err(FrameError::BadCrc);
    }
    let year = 1900 + i32::from(frame[5]);
    NaiveDate::from_ymd_opt(year, u32::from(frame[4]), u32::from(frame[3]))
        .and_then(|d| d.and_hms_opt(u32::from(frame[2]), u32::from(frame[1]), u32::from(frame[0])))
        .ok_or(FrameError::InvalidTimestamp {
            date: u16::from_le_bytes([frame[3], frame[4]]),
            time: u16::from_le_bytes([frame[1], frame[2]]),
        })
}

/// Build a SETTIME payload (or a GETTIME reply).
pub fn encode_console_time(at: NaiveDateTime) -> Result<[u8; CONSOLE_TIME_FRAME_LEN]> {
    let year = at.year() - 1900;
    if !(0..=255).contains(&year) {
        return Err(FrameError::TimestampOutOfRange(at.to_string()));
    }
    let mut buf = vec![
        at.second() as u8,
        at.minute() as u8,
        at.hour() as u8,
        at.day() as u8,
        at.month() as u8,
        year as u8,
    ];
    append_crc(&mut buf);

    let mut frame = [0u8; CONSOLE_TIME_FRAME_LEN];
    frame.copy_from_slice(&buf);
    Ok(frame)
}
