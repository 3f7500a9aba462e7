//! LOOP and LOOP2 current-conditions frames.
//!
//! Both are 99 bytes: `"LOO"`, a bar-trend byte, the packet type at offset 4
//! (0 = LOOP, 1 = LOOP2), the readings, LF CR at 95/96, and a big-endian
//! CRC over the whole frame. Values stay in console units (°F, inHg, mph,
//! rain clicks).

use chrono::NaiveDateTime;

use crate::archive::{ArchiveFormat, ArchiveRecord, ExtraChannels};
use crate::control::LOOP_FRAME_LEN;
use crate::crc::crc_is_valid;
use crate::error::{FrameError, Result};
use crate::fields::Fields;

/// Frame header shared by LOOP and LOOP2.
pub const LOOP_HEADER: &[u8; 3] = b"LOO";

/// Which live frame layout a console was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Loop,
    Loop2,
}

impl LoopKind {
    /// Packet-type byte at offset 4.
    pub fn packet_type(self) -> u8 {
        match self {
            LoopKind::Loop => 0,
            LoopKind::Loop2 => 1,
        }
    }

    pub fn from_packet_type(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LoopKind::Loop),
            1 => Some(LoopKind::Loop2),
            _ => None,
        }
    }

    /// Console command requesting `count` frames of this kind.
    pub fn command(self, count: u16) -> String {
        match self {
            LoopKind::Loop => format!("LOOP {count}"),
            LoopKind::Loop2 => format!("LPS 2 {count}"),
        }
    }
}

/// One decoded live frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopRecord {
    pub kind: LoopKind,
    /// -60, -20, 0, 20 or 60; `None` on consoles that predate the trend.
    pub bar_trend: Option<i8>,
    pub barometer_inhg: Option<f64>,
    pub inside_temp_f: Option<f64>,
    pub inside_humidity: Option<u8>,
    pub outside_temp_f: Option<f64>,
    pub outside_humidity: Option<u8>,
    pub wind_speed_mph: Option<f64>,
    pub wind_dir_deg: Option<u16>,
    pub rain_rate_clicks: Option<u16>,
    pub uv_index: Option<f64>,
    pub solar_wm2: Option<u16>,
    pub storm_rain_clicks: Option<u16>,
    pub day_rain_clicks: Option<u16>,
    pub day_et_in: Option<f64>,
    pub detail: LoopDetail,
}

/// Fields only one of the two layouts carries.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopDetail {
    Loop(LoopFields),
    Loop2(Loop2Fields),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopFields {
    pub wind_avg_10min_mph: Option<f64>,
    pub extra_temps_f: [Option<f64>; 7],
    pub soil_temps_f: [Option<f64>; 4],
    pub leaf_temps_f: [Option<f64>; 4],
    pub extra_humidities: [Option<u8>; 7],
    pub soil_moistures_cb: [Option<u8>; 4],
    pub leaf_wetness: [Option<u8>; 4],
    pub month_rain_clicks: Option<u16>,
    pub year_rain_clicks: Option<u16>,
    pub month_et_in: Option<f64>,
    pub year_et_in: Option<f64>,
    pub transmitter_battery: u8,
    pub console_battery_volts: f64,
    pub forecast_icons: u8,
    pub forecast_rule: u8,
    /// Local sunrise as hour * 100 + minute.
    pub sunrise: Option<u16>,
    pub sunset: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop2Fields {
    pub wind_avg_10min_mph: Option<f64>,
    pub wind_avg_2min_mph: Option<f64>,
    pub gust_10min_mph: Option<f64>,
    pub gust_10min_dir_deg: Option<u16>,
    pub dew_point_f: Option<f64>,
    pub heat_index_f: Option<f64>,
    pub wind_chill_f: Option<f64>,
    pub thsw_index_f: Option<f64>,
    pub rain_15min_clicks: Option<u16>,
    pub rain_last_hour_clicks: Option<u16>,
    pub rain_24h_clicks: Option<u16>,
    pub abs_pressure_inhg: Option<f64>,
    pub altimeter_inhg: Option<f64>,
}

/// Decode a 99-byte LOOP or LOOP2 frame.
///
/// The header and packet type are checked before the CRC so that a stream
/// that has slipped out of alignment reports `BadHeader` / `BadPacketType`
/// (resync) rather than `BadCrc` (drop one record).
pub fn decode_loop(frame: &[u8]) -> Result<LoopRecord> {
    if frame.len() != LOOP_FRAME_LEN {
        return Err(FrameError::BadLength {
            expected: LOOP_FRAME_LEN,
            actual: frame.len(),
        });
    }
    if !frame.starts_with(LOOP_HEADER) {
        return Err(FrameError::BadHeader);
    }
    let kind = LoopKind::from_packet_type(frame[4]).ok_or(FrameError::BadPacketType(frame[4]))?;
    if !crc_is_valid(frame) {
        return Err(FrameError::BadCrc);
    }

    let f = Fields::new(frame);
    let bar_trend = match f.u8(3) {
        b'P' => None,
        _ => Some(f.i8(3)).filter(|t| matches!(*t, -60 | -20 | 0 | 20 | 60)),
    };

    let detail = match kind {
        LoopKind::Loop => LoopDetail::Loop(decode_loop_fields(f)),
        LoopKind::Loop2 => LoopDetail::Loop2(decode_loop2_fields(f)),
    };

    Ok(LoopRecord {
        kind,
        bar_trend,
        barometer_inhg: f.barometer(7),
        inside_temp_f: f.temp_tenths(9),
        inside_humidity: f.humidity(11),
        outside_temp_f: f.temp_tenths(12),
        outside_humidity: f.humidity(33),
        wind_speed_mph: f.wind_mph(14),
        wind_dir_deg: f.degrees(16, true),
        rain_rate_clicks: f.clicks(41),
        uv_index: f.uv(43),
        solar_wm2: f.solar(44),
        storm_rain_clicks: f.clicks(46),
        day_rain_clicks: f.clicks(50),
        day_et_in: Some(f64::from(f.u16_le(56)) / 1000.0),
        detail,
    })
}

fn decode_loop_fields(f: Fields<'_>) -> LoopFields {
    LoopFields {
        wind_avg_10min_mph: f.wind_mph(15),
        extra_temps_f: std::array::from_fn(|i| f.temp_offset90(18 + i)),
        soil_temps_f: std::array::from_fn(|i| f.temp_offset90(25 + i)),
        leaf_temps_f: std::array::from_fn(|i| f.temp_offset90(29 + i)),
        extra_humidities: std::array::from_fn(|i| f.humidity(34 + i)),
        soil_moistures_cb: std::array::from_fn(|i| f.byte(62 + i)),
        leaf_wetness: std::array::from_fn(|i| f.byte(66 + i).filter(|w| *w <= 15)),
        month_rain_clicks: f.clicks(52),
        year_rain_clicks: f.clicks(54),
        month_et_in: Some(f64::from(f.u16_le(58)) / 100.0),
        year_et_in: Some(f64::from(f.u16_le(60)) / 100.0),
        transmitter_battery: f.u8(86),
        console_battery_volts: f64::from(f.u16_le(87)) * 300.0 / 512.0 / 100.0,
        forecast_icons: f.u8(89),
        forecast_rule: f.u8(90),
        sunrise: hhmm(f.u16_le(91)),
        sunset: hhmm(f.u16_le(93)),
    }
}

fn decode_loop2_fields(f: Fields<'_>) -> Loop2Fields {
    Loop2Fields {
        wind_avg_10min_mph: f.wind_tenths_mph(18),
        wind_avg_2min_mph: f.wind_tenths_mph(20),
        gust_10min_mph: f.wind_mph_u16(22),
        gust_10min_dir_deg: f.degrees(24, true),
        dew_point_f: f.temp_whole(30),
        heat_index_f: f.temp_whole(35),
        wind_chill_f: f.temp_whole(37),
        thsw_index_f: f.temp_whole(39),
        rain_15min_clicks: f.clicks(52),
        rain_last_hour_clicks: f.clicks(54),
        rain_24h_clicks: f.clicks(58),
        abs_pressure_inhg: f.barometer(67),
        altimeter_inhg: f.barometer(69),
    }
}

fn hhmm(raw: u16) -> Option<u16> {
    (raw / 100 < 24 && raw % 100 < 60).then_some(raw)
}

impl LoopRecord {
    /// 10-minute gust and its direction (LOOP2 only).
    pub fn gust_10min(&self) -> Option<(f64, Option<u16>)> {
        match &self.detail {
            LoopDetail::Loop2(fields) => fields
                .gust_10min_mph
                .map(|gust| (gust, fields.gust_10min_dir_deg)),
            LoopDetail::Loop(_) => None,
        }
    }

    /// Build a pseudo archive record from live readings, stamped `timestamp`.
    ///
    /// Rain and ET are left empty: live frames carry running day totals,
    /// not per-interval increments. Callers that track the previous totals
    /// fill them in from the difference.
    pub fn to_archive_record(&self, timestamp: NaiveDateTime, interval_minutes: u16) -> ArchiveRecord {
        let wind_avg = match &self.detail {
            LoopDetail::Loop(fields) => fields.wind_avg_10min_mph,
            LoopDetail::Loop2(fields) => fields.wind_avg_2min_mph,
        };
        ArchiveRecord {
            timestamp,
            format: ArchiveFormat::Live,
            interval_minutes,
            outside_temp_f: self.outside_temp_f,
            high_temp_f: self.outside_temp_f,
            low_temp_f: self.outside_temp_f,
            outside_humidity: self.outside_humidity,
            inside_temp_f: self.inside_temp_f,
            inside_humidity: self.inside_humidity,
            wind_avg_mph: wind_avg.or(self.wind_speed_mph),
            wind_high_mph: self.wind_speed_mph,
            wind_high_dir_deg: self.wind_dir_deg.map(f64::from),
            wind_dir_deg: self.wind_dir_deg.map(f64::from),
            rain_clicks: None,
            rain_rate_high_clicks: self.rain_rate_clicks,
            barometer_inhg: self.barometer_inhg,
            solar_wm2: self.solar_wm2,
            solar_high_wm2: self.solar_wm2,
            uv_index: self.uv_index,
            uv_high: self.uv_index,
            et_in: None,
            forecast_rule: None,
            extra: ExtraChannels::default(),
        }
    }
}
