use chrono::NaiveDateTime;
use wxconsole_frame::ArchiveRecord;

/// One reading forwarded to the sample-apply collaborator, in console units.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Humidity(u8),
    Temperature { avg_f: f64, high_f: Option<f64>, low_f: Option<f64> },
    /// Inputs for the dew point derivation.
    DewPoint { temp_f: f64, humidity: u8 },
    /// Inputs for the wind chill derivation.
    WindChill { temp_f: f64, wind_mph: Option<f64> },
    Wind { avg_mph: f64, gust_mph: Option<f64>, dir_deg: Option<f64> },
    Rain { clicks: u16, rate_high_clicks: Option<u16> },
    Pressure(f64),
    Uv(f64),
    Solar(u16),
    Et(f64),
    ExtraTemperature { channel: usize, temp_f: f64 },
    ExtraHumidity { channel: usize, humidity: u8 },
    SoilTemperature { channel: usize, temp_f: f64 },
    SoilMoisture { channel: usize, centibars: u8 },
    LeafTemperature { channel: usize, temp_f: f64 },
    LeafWetness { channel: usize, wetness: u8 },
}

impl Sample {
    /// Short name for logs and counters.
    pub fn name(&self) -> &'static str {
        match self {
            Sample::Humidity(_) => "humidity",
            Sample::Temperature { .. } => "temperature",
            Sample::DewPoint { .. } => "dewpoint",
            Sample::WindChill { .. } => "windchill",
            Sample::Wind { .. } => "wind",
            Sample::Rain { .. } => "rain",
            Sample::Pressure(_) => "pressure",
            Sample::Uv(_) => "uv",
            Sample::Solar(_) => "solar",
            Sample::Et(_) => "et",
            Sample::ExtraTemperature { .. } => "extra-temperature",
            Sample::ExtraHumidity { .. } => "extra-humidity",
            Sample::SoilTemperature { .. } => "soil-temperature",
            Sample::SoilMoisture { .. } => "soil-moisture",
            Sample::LeafTemperature { .. } => "leaf-temperature",
            Sample::LeafWetness { .. } => "leaf-wetness",
        }
    }
}

/// Receives the readings of each record. Derivation and persistence live
/// behind it.
pub trait SampleSink {
    fn apply(&mut self, at: NaiveDateTime, sample: Sample);

    /// Called once every reading of `record` has been applied.
    fn record_done(&mut self, _record: &ArchiveRecord) {}
}

/// Daily housekeeping, run once per boundary crossing before the record at
/// the boundary is applied.
pub trait DayBoundaryHandler {
    fn on_day_rollover(&mut self, record: &ArchiveRecord);
    fn on_midnight(&mut self, _record: &ArchiveRecord) {}
    fn on_nine_am(&mut self, _record: &ArchiveRecord) {}
    fn on_snow_hour(&mut self, _record: &ArchiveRecord) {}
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn apply(&mut self, at: NaiveDateTime, sample: Sample) {
        (**self).apply(at, sample)
    }

    fn record_done(&mut self, record: &ArchiveRecord) {
        (**self).record_done(record)
    }
}

impl<H: DayBoundaryHandler + ?Sized> DayBoundaryHandler for &mut H {
    fn on_day_rollover(&mut self, record: &ArchiveRecord) {
        (**self).on_day_rollover(record)
    }

    fn on_midnight(&mut self, record: &ArchiveRecord) {
        (**self).on_midnight(record)
    }

    fn on_nine_am(&mut self, record: &ArchiveRecord) {
        (**self).on_nine_am(record)
    }

    fn on_snow_hour(&mut self, record: &ArchiveRecord) {
        (**self).on_snow_hour(record)
    }
}
