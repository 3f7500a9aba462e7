//! Archive pages and the 52-byte historic records they carry.
//!
//! Page layout (267 bytes):
//!
//! ```text
//! ┌──────────┬──────────────────────────────┬──────────┬──────────┐
//! │ Seq (1B) │ 5 × record slot (52B each)   │ Rsvd(4B) │ CRC (BE) │
//! └──────────┴──────────────────────────────┴──────────┴──────────┘
//! ```
//!
//! Every record slot starts with the packed date (LE16) and time (LE16) and
//! carries its data-structure type at offset 42. Each type has its own
//! fixed-offset layout for the same logical quantities; see [`Layout`].

use chrono::{NaiveDateTime, Timelike};

use crate::control::{ARCHIVE_PAGE_LEN, ARCHIVE_RECORD_LEN, RECORDS_PER_PAGE};
use crate::crc::crc_is_valid;
use crate::datetime::unpack_timestamp;
use crate::error::{FrameError, Result};
use crate::fields::Fields;

/// Offset of the data-structure type byte in every record slot.
pub const FORMAT_OFFSET: usize = 42;

/// Record layout version, keyed by the data-structure type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Original console firmware (type 0xFF).
    VantageRevA,
    /// Current console firmware (type 0x00).
    VantageRevB,
    /// ISS record relayed by an IP logger (type 0x0B).
    WllIss,
    /// ISS record stored by a touchscreen console (type 0x17).
    ConsoleIss,
    /// Pseudo-record built from live readings; never on the wire.
    Live,
}

impl ArchiveFormat {
    /// Map a data-structure type byte to its layout.
    pub fn from_type_byte(byte: u8) -> Result<Self> {
        match byte {
            0xFF => Ok(ArchiveFormat::VantageRevA),
            0x00 => Ok(ArchiveFormat::VantageRevB),
            0x0B => Ok(ArchiveFormat::WllIss),
            0x17 => Ok(ArchiveFormat::ConsoleIss),
            other => Err(FrameError::UnknownFormat(other)),
        }
    }

    /// The data-structure type byte written at offset 42.
    pub fn type_byte(self) -> Option<u8> {
        match self {
            ArchiveFormat::VantageRevA => Some(0xFF),
            ArchiveFormat::VantageRevB => Some(0x00),
            ArchiveFormat::WllIss => Some(0x0B),
            ArchiveFormat::ConsoleIss => Some(0x17),
            ArchiveFormat::Live => None,
        }
    }

    /// Detect the layout of a record slot.
    pub fn detect(slot: &[u8]) -> Result<Self> {
        check_slot_len(slot)?;
        Self::from_type_byte(slot[FORMAT_OFFSET])
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::VantageRevA => "vantage-rev-a",
            ArchiveFormat::VantageRevB => "vantage-rev-b",
            ArchiveFormat::WllIss => "wll-iss",
            ArchiveFormat::ConsoleIss => "console-iss",
            ArchiveFormat::Live => "live",
        }
    }

    pub(crate) fn layout(self) -> Option<&'static Layout> {
        match self {
            ArchiveFormat::VantageRevA => Some(&VANTAGE_REV_A),
            ArchiveFormat::VantageRevB => Some(&VANTAGE_REV_B),
            ArchiveFormat::WllIss => Some(&WLL_ISS),
            ArchiveFormat::ConsoleIss => Some(&CONSOLE_ISS),
            ArchiveFormat::Live => None,
        }
    }
}

/// One decoded historic sample. Missing readings are `None`, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    /// End of the logging interval, console local time.
    pub timestamp: NaiveDateTime,
    pub format: ArchiveFormat,
    pub interval_minutes: u16,
    pub outside_temp_f: Option<f64>,
    pub high_temp_f: Option<f64>,
    pub low_temp_f: Option<f64>,
    pub outside_humidity: Option<u8>,
    pub inside_temp_f: Option<f64>,
    pub inside_humidity: Option<u8>,
    pub wind_avg_mph: Option<f64>,
    pub wind_high_mph: Option<f64>,
    pub wind_high_dir_deg: Option<f64>,
    /// Prevailing direction over the interval.
    pub wind_dir_deg: Option<f64>,
    /// Rain during the interval.
    pub rain_clicks: Option<u16>,
    pub rain_rate_high_clicks: Option<u16>,
    pub barometer_inhg: Option<f64>,
    pub solar_wm2: Option<u16>,
    pub solar_high_wm2: Option<u16>,
    pub uv_index: Option<f64>,
    pub uv_high: Option<f64>,
    /// ET accumulated over the interval, inches.
    pub et_in: Option<f64>,
    pub forecast_rule: Option<u8>,
    pub extra: ExtraChannels,
}

impl ArchiveRecord {
    /// Hour of the record timestamp (0-23).
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Optional extra sensor stations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraChannels {
    pub extra_temps_f: [Option<f64>; 3],
    pub extra_humidities: [Option<u8>; 2],
    pub soil_temps_f: [Option<f64>; 4],
    pub soil_moistures_cb: [Option<u8>; 4],
    pub leaf_temps_f: [Option<f64>; 2],
    pub leaf_wetness: [Option<u8>; 2],
}

impl ExtraChannels {
    /// No extra channel reported anything.
    pub fn is_empty(&self) -> bool {
        self.extra_temps_f.iter().all(Option::is_none)
            && self.extra_humidities.iter().all(Option::is_none)
            && self.soil_temps_f.iter().all(Option::is_none)
            && self.soil_moistures_cb.iter().all(Option::is_none)
            && self.leaf_temps_f.iter().all(Option::is_none)
            && self.leaf_wetness.iter().all(Option::is_none)
    }
}

/// How a wind speed is stored.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WindField {
    /// Whole mph, one byte.
    Mph8(usize),
    /// Tenths of mph, LE16.
    Tenths16(usize),
}

/// How a direction is stored.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DirField {
    /// Compass point 0-15, one byte.
    Compass(usize),
    /// Whole degrees, LE16.
    Degrees(usize),
}

/// How interval ET is stored.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EtField {
    /// Thousandths of an inch, one byte.
    Milli8(usize),
    /// Thousandths of an inch, LE16.
    Milli16(usize),
}

/// Fixed offsets of one record format.
#[derive(Debug)]
pub(crate) struct Layout {
    pub(crate) temp_avg: usize,
    pub(crate) temp_high: usize,
    pub(crate) temp_low: usize,
    pub(crate) humidity: usize,
    pub(crate) inside_temp: Option<usize>,
    pub(crate) inside_humidity: Option<usize>,
    pub(crate) wind_avg: WindField,
    pub(crate) wind_high: WindField,
    pub(crate) wind_high_dir: DirField,
    pub(crate) wind_dir: DirField,
    pub(crate) rain: usize,
    pub(crate) rain_rate_high: usize,
    pub(crate) barometer: Option<usize>,
    pub(crate) solar: usize,
    pub(crate) solar_high: Option<usize>,
    pub(crate) uv: usize,
    pub(crate) uv_high: Option<usize>,
    pub(crate) et: Option<EtField>,
    pub(crate) forecast_rule: Option<usize>,
    /// Interval minutes stored in the record itself.
    pub(crate) interval: Option<usize>,
    /// Extra/soil/leaf channels at the Vantage rev B offsets.
    pub(crate) extra_channels: bool,
}

pub(crate) static VANTAGE_REV_B: Layout = REV_B;

// Rev A firmware never wrote the high solar/UV, forecast or extra-station
// bytes; they hold 0xFF.
static VANTAGE_REV_A: Layout = Layout {
    solar_high: None,
    uv_high: None,
    forecast_rule: None,
    extra_channels: false,
    ..REV_B
};

const REV_B: Layout = Layout {
    temp_avg: 4,
    temp_high: 6,
    temp_low: 8,
    humidity: 23,
    inside_temp: Some(20),
    inside_humidity: Some(22),
    wind_avg: WindField::Mph8(24),
    wind_high: WindField::Mph8(25),
    wind_high_dir: DirField::Compass(26),
    wind_dir: DirField::Compass(27),
    rain: 10,
    rain_rate_high: 12,
    barometer: Some(14),
    solar: 16,
    solar_high: Some(30),
    uv: 28,
    uv_high: Some(32),
    et: Some(EtField::Milli8(29)),
    forecast_rule: Some(33),
    interval: None,
    extra_channels: true,
};

static WLL_ISS: Layout = Layout {
    temp_avg: 4,
    temp_high: 6,
    temp_low: 8,
    humidity: 10,
    inside_temp: None,
    inside_humidity: None,
    wind_avg: WindField::Mph8(11),
    wind_high: WindField::Mph8(12),
    wind_high_dir: DirField::Compass(13),
    wind_dir: DirField::Compass(14),
    rain: 15,
    rain_rate_high: 17,
    barometer: None,
    solar: 19,
    solar_high: Some(21),
    uv: 23,
    uv_high: Some(24),
    et: Some(EtField::Milli16(25)),
    forecast_rule: None,
    interval: Some(43),
    extra_channels: false,
};

static CONSOLE_ISS: Layout = Layout {
    temp_avg: 4,
    temp_high: 6,
    temp_low: 8,
    humidity: 12,
    inside_temp: Some(33),
    inside_humidity: Some(35),
    wind_avg: WindField::Tenths16(13),
    wind_high: WindField::Tenths16(15),
    wind_high_dir: DirField::Degrees(17),
    wind_dir: DirField::Degrees(19),
    rain: 21,
    rain_rate_high: 23,
    barometer: Some(10),
    solar: 25,
    solar_high: Some(27),
    uv: 29,
    uv_high: Some(30),
    et: Some(EtField::Milli16(31)),
    forecast_rule: None,
    interval: Some(43),
    extra_channels: false,
};

/// Decode one 52-byte record slot.
///
/// `interval_minutes` is used for formats that do not store their own
/// interval. Returns `Ok(None)` for a slot that was never written.
pub fn decode_archive_record(
    slot: &[u8],
    format: ArchiveFormat,
    interval_minutes: u16,
) -> Result<Option<ArchiveRecord>> {
    check_slot_len(slot)?;
    let f = Fields::new(slot);
    let Some(timestamp) = unpack_timestamp(f.u16_le(0), f.u16_le(2))? else {
        return Ok(None);
    };
    let layout = format
        .layout()
        .ok_or(FrameError::UnknownFormat(slot[FORMAT_OFFSET]))?;

    let interval_minutes = layout
        .interval
        .and_then(|offset| f.byte(offset))
        .filter(|minutes| *minutes > 0)
        .map(u16::from)
        .unwrap_or(interval_minutes);

    Ok(Some(ArchiveRecord {
        timestamp,
        format,
        interval_minutes,
        outside_temp_f: f.temp_tenths(layout.temp_avg),
        high_temp_f: f.temp_tenths(layout.temp_high),
        low_temp_f: f.temp_tenths(layout.temp_low),
        outside_humidity: f.humidity(layout.humidity),
        inside_temp_f: layout.inside_temp.and_then(|o| f.temp_tenths(o)),
        inside_humidity: layout.inside_humidity.and_then(|o| f.humidity(o)),
        wind_avg_mph: wind(f, layout.wind_avg),
        wind_high_mph: wind(f, layout.wind_high),
        wind_high_dir_deg: direction(f, layout.wind_high_dir),
        wind_dir_deg: direction(f, layout.wind_dir),
        rain_clicks: f.clicks(layout.rain),
        rain_rate_high_clicks: f.clicks(layout.rain_rate_high),
        barometer_inhg: layout.barometer.and_then(|o| f.barometer(o)),
        solar_wm2: f.solar(layout.solar),
        solar_high_wm2: layout.solar_high.and_then(|o| f.solar(o)),
        uv_index: f.uv(layout.uv),
        uv_high: layout.uv_high.and_then(|o| f.uv(o)),
        et_in: layout.et.and_then(|et| match et {
            EtField::Milli8(o) => f.byte(o).map(|raw| f64::from(raw) / 1000.0),
            EtField::Milli16(o) => f.clicks(o).map(|raw| f64::from(raw) / 1000.0),
        }),
        forecast_rule: layout.forecast_rule.and_then(|o| f.byte(o)),
        extra: if layout.extra_channels {
            decode_extra_channels(f)
        } else {
            ExtraChannels::default()
        },
    }))
}

fn wind(f: Fields<'_>, field: WindField) -> Option<f64> {
    match field {
        WindField::Mph8(o) => f.wind_mph(o),
        WindField::Tenths16(o) => f.wind_tenths_mph(o),
    }
}

fn direction(f: Fields<'_>, field: DirField) -> Option<f64> {
    match field {
        DirField::Compass(o) => f.compass(o),
        DirField::Degrees(o) => match f.u16_le(o) {
            0x7FFF | u16::MAX => None,
            _ => f.degrees(o, false).map(f64::from),
        },
    }
}

fn decode_extra_channels(f: Fields<'_>) -> ExtraChannels {
    ExtraChannels {
        extra_temps_f: std::array::from_fn(|i| f.temp_offset90(45 + i)),
        extra_humidities: std::array::from_fn(|i| f.humidity(43 + i)),
        soil_temps_f: std::array::from_fn(|i| f.temp_offset90(38 + i)),
        soil_moistures_cb: std::array::from_fn(|i| f.byte(48 + i)),
        leaf_temps_f: std::array::from_fn(|i| f.temp_offset90(34 + i)),
        leaf_wetness: std::array::from_fn(|i| f.byte(36 + i).filter(|w| *w <= 15)),
    }
}

fn check_slot_len(slot: &[u8]) -> Result<()> {
    if slot.len() != ARCHIVE_RECORD_LEN {
        return Err(FrameError::BadLength {
            expected: ARCHIVE_RECORD_LEN,
            actual: slot.len(),
        });
    }
    Ok(())
}

/// A CRC-validated archive page.
#[derive(Debug, Clone)]
pub struct ArchivePage {
    bytes: [u8; ARCHIVE_PAGE_LEN],
}

impl ArchivePage {
    /// Validate length and CRC.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; ARCHIVE_PAGE_LEN] = bytes.try_into().map_err(|_| FrameError::BadLength {
            expected: ARCHIVE_PAGE_LEN,
            actual: bytes.len(),
        })?;
        Self::from_bytes(bytes)
    }

    /// Validate the CRC of a page read straight into a page-sized buffer.
    pub fn from_bytes(bytes: [u8; ARCHIVE_PAGE_LEN]) -> Result<Self> {
        if !crc_is_valid(&bytes) {
            tracing::debug!(sequence = bytes[0], "archive page failed CRC");
            return Err(FrameError::BadCrc);
        }
        Ok(Self { bytes })
    }

    /// Page sequence number assigned by the console.
    pub fn sequence(&self) -> u8 {
        self.bytes[0]
    }

    /// Record slot `index` (0-4).
    pub fn slot(&self, index: usize) -> &[u8] {
        let start = 1 + index * ARCHIVE_RECORD_LEN;
        &self.bytes[start..start + ARCHIVE_RECORD_LEN]
    }

    /// Slots from `first` to the end of the page.
    pub fn slots_from(&self, first: usize) -> impl Iterator<Item = &[u8]> + '_ {
        (first.min(RECORDS_PER_PAGE)..RECORDS_PER_PAGE).map(move |i| self.slot(i))
    }
}
