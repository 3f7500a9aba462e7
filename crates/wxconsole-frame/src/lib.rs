//! Frame codecs for weather-station console replies.
//!
//! Every binary reply a console sends is a fixed-size frame closed by a
//! big-endian CRC-16 over the whole frame:
//! - LOOP / LOOP2 current conditions (99 bytes)
//! - archive pages of five historic records (267 bytes)
//! - DMPAFT date/time requests and page-count replies (6 bytes)
//! - console clock frames (8 bytes)
//!
//! Decoders never panic on hostile input: wrong sizes, bad headers and bad
//! CRCs come back as [`FrameError`]. Missing sensor readings decode to
//! `None`.

pub mod archive;
pub mod builder;
pub mod control;
pub mod crc;
pub mod datetime;
pub mod error;
mod fields;
pub mod loop_packet;

pub use archive::{decode_archive_record, ArchiveFormat, ArchivePage, ArchiveRecord, ExtraChannels};
pub use builder::{encode_archive_page, ArchiveRecordBuilder, LoopFrameBuilder};
pub use control::{
    ACK, ARCHIVE_PAGE_LEN, ARCHIVE_RECORD_LEN, CANCEL, CONSOLE_TIME_FRAME_LEN, DATETIME_FRAME_LEN, ESC,
    LOOP_FRAME_LEN, NAK, OK_REPLY, RECORDS_PER_PAGE, WAKE_REPLY, WHOLE_LOGGER_PAGES,
};
pub use crc::{append_crc, crc16, crc_is_valid};
pub use datetime::{
    decode_console_time, decode_page_header, encode_console_time, encode_dmpaft_request, encode_page_header,
    PageHeader,
};
pub use error::{FrameError, Result};
pub use loop_packet::{decode_loop, LoopDetail, LoopKind, LoopRecord};
