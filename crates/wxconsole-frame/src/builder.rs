//! Console-side encoders: build the frames a console would send.
//!
//! Used by the simulated console and by tests. Every builder starts from the
//! "no sensor" sentinels, so only the readings a test sets are present.

use bytes::BufMut;
use chrono::NaiveDateTime;

use crate::archive::{ArchiveFormat, DirField, EtField, WindField, FORMAT_OFFSET};
use crate::control::{ARCHIVE_PAGE_LEN, ARCHIVE_RECORD_LEN, CR, LF, LOOP_FRAME_LEN, RECORDS_PER_PAGE};
use crate::crc::crc16;
use crate::datetime::{pack_date, pack_time};
use crate::loop_packet::{LoopKind, LOOP_HEADER};

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    (&mut buf[offset..offset + 2]).put_u16_le(value);
}

fn put_i16(buf: &mut [u8], offset: usize, value: i16) {
    (&mut buf[offset..offset + 2]).put_i16_le(value);
}

fn seal(buf: &mut [u8]) {
    let end = buf.len() - 2;
    let crc = crc16(&buf[..end]);
    (&mut buf[end..]).put_u16(crc);
}

fn tenths(value: f64) -> i16 {
    (value * 10.0).round() as i16
}

/// Builds a 99-byte LOOP or LOOP2 frame.
#[derive(Debug, Clone)]
pub struct LoopFrameBuilder {
    kind: LoopKind,
    frame: [u8; LOOP_FRAME_LEN],
}

impl LoopFrameBuilder {
    pub fn new(kind: LoopKind) -> Self {
        let mut frame = [0u8; LOOP_FRAME_LEN];
        frame[..3].copy_from_slice(LOOP_HEADER);
        frame[3] = match kind {
            LoopKind::Loop => b'P',
            LoopKind::Loop2 => 0,
        };
        frame[4] = kind.packet_type();
        put_u16(&mut frame, 5, 0x7FFF);
        put_i16(&mut frame, 9, i16::MAX);
        frame[11] = u8::MAX;
        put_i16(&mut frame, 12, i16::MAX);
        frame[14] = u8::MAX;
        frame[15] = u8::MAX;
        frame[33] = u8::MAX;
        frame[43] = u8::MAX;
        put_u16(&mut frame, 44, 0x7FFF);
        match kind {
            LoopKind::Loop => {
                // extra/soil/leaf temperatures and extra humidities
                frame[18..41].fill(u8::MAX);
                // soil moistures and leaf wetness
                frame[62..70].fill(u8::MAX);
            }
            LoopKind::Loop2 => {
                put_u16(&mut frame, 18, 0x7FFF);
                put_u16(&mut frame, 20, 0x7FFF);
                put_u16(&mut frame, 22, 0x7FFF);
                for offset in [30, 35, 37, 39] {
                    put_i16(&mut frame, offset, 255);
                }
                put_u16(&mut frame, 54, u16::MAX);
            }
        }
        frame[95] = LF;
        frame[96] = CR;
        Self { kind, frame }
    }

    pub fn kind(&self) -> LoopKind {
        self.kind
    }

    pub fn barometer_inhg(mut self, value: f64) -> Self {
        put_u16(&mut self.frame, 7, (value * 1000.0).round() as u16);
        self
    }

    pub fn inside(mut self, temp_f: f64, humidity: u8) -> Self {
        put_i16(&mut self.frame, 9, tenths(temp_f));
        self.frame[11] = humidity;
        self
    }

    pub fn outside_temp_f(mut self, value: f64) -> Self {
        put_i16(&mut self.frame, 12, tenths(value));
        self
    }

    pub fn outside_humidity(mut self, value: u8) -> Self {
        self.frame[33] = value;
        self
    }

    pub fn wind(mut self, speed_mph: u8, dir_deg: u16) -> Self {
        self.frame[14] = speed_mph;
        put_u16(&mut self.frame, 16, dir_deg);
        self
    }

    pub fn rain_rate_clicks(mut self, value: u16) -> Self {
        put_u16(&mut self.frame, 41, value);
        self
    }

    pub fn day_rain_clicks(mut self, value: u16) -> Self {
        put_u16(&mut self.frame, 50, value);
        self
    }

    pub fn day_et_in(mut self, value: f64) -> Self {
        put_u16(&mut self.frame, 56, (value * 1000.0).round() as u16);
        self
    }

    pub fn solar(mut self, value: u16) -> Self {
        put_u16(&mut self.frame, 44, value);
        self
    }

    pub fn uv(mut self, value: f64) -> Self {
        self.frame[43] = (value * 10.0).round() as u8;
        self
    }

    /// LOOP2 10-minute gust; ignored for LOOP frames.
    pub fn gust_10min(mut self, speed_mph: u16, dir_deg: u16) -> Self {
        if self.kind == LoopKind::Loop2 {
            put_u16(&mut self.frame, 22, speed_mph);
            put_u16(&mut self.frame, 24, dir_deg);
        }
        self
    }

    pub fn build(mut self) -> [u8; LOOP_FRAME_LEN] {
        seal(&mut self.frame);
        self.frame
    }
}

/// Builds one 52-byte archive record slot in a given layout.
#[derive(Debug, Clone)]
pub struct ArchiveRecordBuilder {
    format: ArchiveFormat,
    slot: [u8; ARCHIVE_RECORD_LEN],
}

impl ArchiveRecordBuilder {
    /// Start a record stamped `timestamp` with every reading missing.
    ///
    /// [`ArchiveFormat::Live`] has no wire layout; it is built as rev B.
    pub fn new(format: ArchiveFormat, timestamp: NaiveDateTime) -> Self {
        let format = match format {
            ArchiveFormat::Live => ArchiveFormat::VantageRevB,
            other => other,
        };
        let mut slot = [u8::MAX; ARCHIVE_RECORD_LEN];
        let date = pack_date(timestamp.date()).unwrap_or(u16::MAX);
        put_u16(&mut slot, 0, date);
        put_u16(&mut slot, 2, pack_time(timestamp.time()));
        slot[FORMAT_OFFSET] = format.type_byte().unwrap_or(0);

        let mut builder = Self { format, slot };
        if let Some(layout) = format.layout() {
            for offset in [layout.temp_avg, layout.temp_high, layout.temp_low] {
                put_i16(&mut builder.slot, offset, i16::MAX);
            }
            if let Some(offset) = layout.inside_temp {
                put_i16(&mut builder.slot, offset, i16::MAX);
            }
            if let DirField::Degrees(offset) = layout.wind_high_dir {
                put_u16(&mut builder.slot, offset, 0x7FFF);
            }
            if let DirField::Degrees(offset) = layout.wind_dir {
                put_u16(&mut builder.slot, offset, 0x7FFF);
            }
            for field in [layout.wind_avg, layout.wind_high] {
                if let WindField::Tenths16(offset) = field {
                    put_u16(&mut builder.slot, offset, 0x7FFF);
                }
            }
            put_u16(&mut builder.slot, layout.rain, 0);
            put_u16(&mut builder.slot, layout.rain_rate_high, 0);
            if let Some(offset) = layout.barometer {
                put_u16(&mut builder.slot, offset, 0);
            }
            put_u16(&mut builder.slot, layout.solar, 0x7FFF);
            if let Some(offset) = layout.solar_high {
                put_u16(&mut builder.slot, offset, 0x7FFF);
            }
            match layout.et {
                Some(EtField::Milli8(offset)) => builder.slot[offset] = 0,
                Some(EtField::Milli16(offset)) => put_u16(&mut builder.slot, offset, 0),
                None => {}
            }
        }
        builder
    }

    fn layout(&self) -> &'static crate::archive::Layout {
        // `new` never stores `Live`
        self.format.layout().unwrap_or(&crate::archive::VANTAGE_REV_B)
    }

    pub fn temperature(mut self, avg_f: f64, high_f: f64, low_f: f64) -> Self {
        let layout = self.layout();
        put_i16(&mut self.slot, layout.temp_avg, tenths(avg_f));
        put_i16(&mut self.slot, layout.temp_high, tenths(high_f));
        put_i16(&mut self.slot, layout.temp_low, tenths(low_f));
        self
    }

    pub fn humidity(mut self, value: u8) -> Self {
        self.slot[self.layout().humidity] = value;
        self
    }

    pub fn inside(mut self, temp_f: f64, humidity: u8) -> Self {
        let layout = self.layout();
        if let Some(offset) = layout.inside_temp {
            put_i16(&mut self.slot, offset, tenths(temp_f));
        }
        if let Some(offset) = layout.inside_humidity {
            self.slot[offset] = humidity;
        }
        self
    }

    /// Average and high speed, high-speed direction and prevailing direction.
    pub fn wind(mut self, avg_mph: f64, high_mph: f64, high_dir_deg: f64, dir_deg: f64) -> Self {
        let layout = self.layout();
        for (field, mph) in [(layout.wind_avg, avg_mph), (layout.wind_high, high_mph)] {
            match field {
                WindField::Mph8(o) => self.slot[o] = mph.round() as u8,
                WindField::Tenths16(o) => put_u16(&mut self.slot, o, (mph * 10.0).round() as u16),
            }
        }
        for (field, deg) in [(layout.wind_high_dir, high_dir_deg), (layout.wind_dir, dir_deg)] {
            match field {
                DirField::Compass(o) => self.slot[o] = ((deg / 22.5).round() as u8) % 16,
                DirField::Degrees(o) => put_u16(&mut self.slot, o, deg.round() as u16),
            }
        }
        self
    }

    pub fn rain(mut self, clicks: u16, rate_high_clicks: u16) -> Self {
        let layout = self.layout();
        put_u16(&mut self.slot, layout.rain, clicks);
        put_u16(&mut self.slot, layout.rain_rate_high, rate_high_clicks);
        self
    }

    /// Ignored for layouts without a barometer.
    pub fn barometer(mut self, inhg: f64) -> Self {
        if let Some(offset) = self.layout().barometer {
            put_u16(&mut self.slot, offset, (inhg * 1000.0).round() as u16);
        }
        self
    }

    pub fn solar(mut self, wm2: u16) -> Self {
        let offset = self.layout().solar;
        put_u16(&mut self.slot, offset, wm2);
        self
    }

    pub fn uv(mut self, index: f64) -> Self {
        self.slot[self.layout().uv] = (index * 10.0).round() as u8;
        self
    }

    pub fn et(mut self, inches: f64) -> Self {
        let milli = (inches * 1000.0).round();
        match self.layout().et {
            Some(EtField::Milli8(o)) => self.slot[o] = milli as u8,
            Some(EtField::Milli16(o)) => put_u16(&mut self.slot, o, milli as u16),
            None => {}
        }
        self
    }

    /// Ignored for layouts that do not store their own interval.
    pub fn interval(mut self, minutes: u8) -> Self {
        if let Some(offset) = self.layout().interval {
            self.slot[offset] = minutes;
        }
        self
    }

    pub fn build(self) -> [u8; ARCHIVE_RECORD_LEN] {
        self.slot
    }
}

/// Assemble a 267-byte archive page. Missing slots are left blank (0xFF).
pub fn encode_archive_page(sequence: u8, slots: &[[u8; ARCHIVE_RECORD_LEN]]) -> [u8; ARCHIVE_PAGE_LEN] {
    let mut page = [u8::MAX; ARCHIVE_PAGE_LEN];
    page[0] = sequence;
    for (i, slot) in slots.iter().take(RECORDS_PER_PAGE).enumerate() {
        let start = 1 + i * ARCHIVE_RECORD_LEN;
        page[start..start + ARCHIVE_RECORD_LEN].copy_from_slice(slot);
    }
    seal(&mut page);
    page
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::crc::crc_is_valid;

    #[test]
    fn built_frames_carry_valid_crc() {
        assert!(crc_is_valid(&LoopFrameBuilder::new(LoopKind::Loop).build()));
        assert!(crc_is_valid(&LoopFrameBuilder::new(LoopKind::Loop2).build()));
        assert!(crc_is_valid(&encode_archive_page(1, &[])));
    }

    #[test]
    fn loop_frame_terminator() {
        let frame = LoopFrameBuilder::new(LoopKind::Loop).build();
        assert_eq!(&frame[..3], b"LOO");
        assert_eq!(frame[95], LF);
        assert_eq!(frame[96], CR);
    }

    #[test]
    fn record_slot_starts_with_packed_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let slot = ArchiveRecordBuilder::new(ArchiveFormat::VantageRevB, ts).build();
        assert_eq!(u16::from_le_bytes([slot[0], slot[1]]), 12_399);
        assert_eq!(u16::from_le_bytes([slot[2], slot[3]]), 1030);
        assert_eq!(slot[FORMAT_OFFSET], 0x00);
    }
}
