use std::io::IsTerminal;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wxconsole::frame::{ArchiveRecord, LoopRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A record printable as a table row, a JSON line or a one-line summary.
pub trait Row: Serialize {
    fn header() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
    fn pretty(&self) -> String;
}

/// Print one row as it arrives. Tables are only printed by [`print_rows`].
pub fn print_row<R: Row>(row: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(row),
        OutputFormat::Pretty => println!("{}", row.pretty()),
        OutputFormat::Table => {}
    }
}

pub fn print_rows<R: Row>(rows: &[R], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(R::header());
            for row in rows {
                table.add_row(row.cells());
            }
            println!("{table}");
        }
        _ => {
            for row in rows {
                print_row(row, format);
            }
        }
    }
}

/// Print a key/value summary.
pub fn print_summary<T: Serialize>(value: &T, pairs: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            for (key, val) in pairs {
                table.add_row(vec![key.to_string(), val.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = pairs.iter().map(|(key, val)| format!("{key}={val}")).collect();
            println!("{}", line.join(" "));
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn opt1(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string())
}

fn opt2(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Serialize)]
pub struct LoopRow {
    pub received: String,
    pub kind: &'static str,
    pub barometer_inhg: Option<f64>,
    pub bar_trend: Option<i8>,
    pub outside_temp_f: Option<f64>,
    pub outside_humidity: Option<u8>,
    pub inside_temp_f: Option<f64>,
    pub wind_mph: Option<f64>,
    pub wind_dir_deg: Option<u16>,
    pub gust_10min_mph: Option<f64>,
    pub rain_rate_clicks: Option<u16>,
    pub day_rain_clicks: Option<u16>,
    pub solar_wm2: Option<u16>,
    pub uv_index: Option<f64>,
}

impl LoopRow {
    pub fn new(record: &LoopRecord, received: NaiveDateTime) -> Self {
        Self {
            received: received.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: match record.kind {
                wxconsole::frame::LoopKind::Loop => "LOOP",
                wxconsole::frame::LoopKind::Loop2 => "LOOP2",
            },
            barometer_inhg: record.barometer_inhg,
            bar_trend: record.bar_trend,
            outside_temp_f: record.outside_temp_f,
            outside_humidity: record.outside_humidity,
            inside_temp_f: record.inside_temp_f,
            wind_mph: record.wind_speed_mph,
            wind_dir_deg: record.wind_dir_deg,
            gust_10min_mph: record.gust_10min().map(|(speed, _)| speed),
            rain_rate_clicks: record.rain_rate_clicks,
            day_rain_clicks: record.day_rain_clicks,
            solar_wm2: record.solar_wm2,
            uv_index: record.uv_index,
        }
    }
}

impl Row for LoopRow {
    fn header() -> Vec<&'static str> {
        vec![
            "RECEIVED", "KIND", "BARO", "TEMP", "HUM", "IN", "WIND", "DIR", "GUST", "RATE", "DAY RAIN", "SOLAR",
            "UV",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.received.clone(),
            self.kind.to_string(),
            opt2(self.barometer_inhg),
            opt1(self.outside_temp_f),
            opt(self.outside_humidity),
            opt1(self.inside_temp_f),
            opt1(self.wind_mph),
            opt(self.wind_dir_deg),
            opt1(self.gust_10min_mph),
            opt(self.rain_rate_clicks),
            opt(self.day_rain_clicks),
            opt(self.solar_wm2),
            opt1(self.uv_index),
        ]
    }

    fn pretty(&self) -> String {
        format!(
            "{} {} temp={}F hum={}% wind={}mph@{} baro={}inHg rain_day={} solar={} uv={}",
            self.received,
            self.kind,
            opt1(self.outside_temp_f),
            opt(self.outside_humidity),
            opt1(self.wind_mph),
            opt(self.wind_dir_deg),
            opt2(self.barometer_inhg),
            opt(self.day_rain_clicks),
            opt(self.solar_wm2),
            opt1(self.uv_index),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ArchiveRow {
    pub timestamp: String,
    pub format: &'static str,
    pub interval_minutes: u16,
    pub outside_temp_f: Option<f64>,
    pub high_temp_f: Option<f64>,
    pub low_temp_f: Option<f64>,
    pub outside_humidity: Option<u8>,
    pub wind_avg_mph: Option<f64>,
    pub wind_high_mph: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub rain_clicks: Option<u16>,
    pub barometer_inhg: Option<f64>,
    pub solar_wm2: Option<u16>,
    pub uv_index: Option<f64>,
    pub et_in: Option<f64>,
}

impl From<&ArchiveRecord> for ArchiveRow {
    fn from(record: &ArchiveRecord) -> Self {
        Self {
            timestamp: timestamp(record.timestamp),
            format: record.format.name(),
            interval_minutes: record.interval_minutes,
            outside_temp_f: record.outside_temp_f,
            high_temp_f: record.high_temp_f,
            low_temp_f: record.low_temp_f,
            outside_humidity: record.outside_humidity,
            wind_avg_mph: record.wind_avg_mph,
            wind_high_mph: record.wind_high_mph,
            wind_dir_deg: record.wind_dir_deg,
            rain_clicks: record.rain_clicks,
            barometer_inhg: record.barometer_inhg,
            solar_wm2: record.solar_wm2,
            uv_index: record.uv_index,
            et_in: record.et_in,
        }
    }
}

impl Row for ArchiveRow {
    fn header() -> Vec<&'static str> {
        vec![
            "TIME", "FORMAT", "TEMP", "HI", "LO", "HUM", "WIND", "GUST", "DIR", "RAIN", "BARO", "SOLAR", "UV",
            "ET",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            self.format.to_string(),
            opt1(self.outside_temp_f),
            opt1(self.high_temp_f),
            opt1(self.low_temp_f),
            opt(self.outside_humidity),
            opt1(self.wind_avg_mph),
            opt1(self.wind_high_mph),
            opt1(self.wind_dir_deg),
            opt(self.rain_clicks),
            opt2(self.barometer_inhg),
            opt(self.solar_wm2),
            opt1(self.uv_index),
            opt2(self.et_in),
        ]
    }

    fn pretty(&self) -> String {
        format!(
            "{} [{}] temp={}F ({}..{}) hum={}% wind={}mph gust={} rain={} baro={}inHg",
            self.timestamp,
            self.format,
            opt1(self.outside_temp_f),
            opt1(self.low_temp_f),
            opt1(self.high_temp_f),
            opt(self.outside_humidity),
            opt1(self.wind_avg_mph),
            opt1(self.wind_high_mph),
            opt(self.rain_clicks),
            opt2(self.barometer_inhg),
        )
    }
}

/// One day boundary fired during a replay.
#[derive(Debug, Serialize)]
pub struct BoundaryRow {
    pub timestamp: String,
    pub boundary: &'static str,
}

impl Row for BoundaryRow {
    fn header() -> Vec<&'static str> {
        vec!["TIME", "BOUNDARY"]
    }

    fn cells(&self) -> Vec<String> {
        vec![self.timestamp.clone(), self.boundary.to_string()]
    }

    fn pretty(&self) -> String {
        format!("{} {}", self.timestamp, self.boundary)
    }
}
