//! Protocol control bytes and fixed frame sizes.

/// Positive acknowledgement; also requests the next archive page.
pub const ACK: u8 = 0x06;

/// Negative acknowledgement; asks the console to resend a page.
pub const NAK: u8 = 0x21;

/// Sent by the console when a request frame fails its CRC.
pub const CANCEL: u8 = 0x18;

/// Aborts an archive download.
pub const ESC: u8 = 0x1B;

pub const LF: u8 = 0x0A;
pub const CR: u8 = 0x0D;

/// Console reply to a wake-up newline.
pub const WAKE_REPLY: [u8; 2] = [LF, CR];

/// Console reply to text commands that succeed.
pub const OK_REPLY: &[u8] = b"\n\rOK\n\r";

/// LOOP and LOOP2 frames, CRC included.
pub const LOOP_FRAME_LEN: usize = 99;

/// One archive page: sequence byte, five records, reserved, CRC.
pub const ARCHIVE_PAGE_LEN: usize = 267;

/// One archive record slot.
pub const ARCHIVE_RECORD_LEN: usize = 52;

/// Record slots per archive page.
pub const RECORDS_PER_PAGE: usize = 5;

/// DMPAFT date/time request and page-count reply, CRC included.
pub const DATETIME_FRAME_LEN: usize = 6;

/// GETTIME reply and SETTIME payload, CRC included.
pub const CONSOLE_TIME_FRAME_LEN: usize = 8;

/// Page count at which the console is replaying its entire logger.
pub const WHOLE_LOGGER_PAGES: u16 = 512;

/// Human-readable name for a control byte, for diagnostics.
pub fn control_name(byte: u8) -> &'static str {
    match byte {
        ACK => "ACK",
        NAK => "NAK",
        CANCEL => "CANCEL",
        ESC => "ESC",
        LF => "LF",
        CR => "CR",
        _ => "DATA",
    }
}
