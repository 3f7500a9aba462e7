use std::ops::RangeInclusive;

use chrono::{NaiveDateTime, Timelike};
use tracing::{debug, info, warn};
use wxconsole_frame::ArchiveRecord;

use crate::boundary::{roll_hour, BoundaryEvents, RolloverState};
use crate::config::{PlausibilityLimits, RolloverConfig};
use crate::daylight::{DaylightProbe, LocalDaylight};
use crate::error::{CatchupError, Result};
use crate::sink::{DayBoundaryHandler, Sample, SampleSink};

/// Running totals for one sequencer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchupStats {
    /// Records applied (archive and live).
    pub records: usize,
    pub live_records: usize,
    /// Records refused for arriving out of order.
    pub out_of_order: usize,
    /// Readings skipped because the console reported none.
    pub missing: usize,
    /// Readings skipped as implausible.
    pub implausible: usize,
    pub rollovers: usize,
    pub midnights: usize,
    pub nine_ams: usize,
    pub snow_hours: usize,
}

/// Replays records in timestamp order, firing day-boundary housekeeping
/// exactly once per boundary and forwarding readings to the sink.
///
/// The same sequencer keeps running into live polling, so a boundary
/// handled during catch-up is never fired again.
pub struct CatchupSequencer<H, S> {
    config: RolloverConfig,
    limits: PlausibilityLimits,
    daylight: Box<dyn DaylightProbe>,
    state: RolloverState,
    primed: bool,
    last: Option<NaiveDateTime>,
    handler: H,
    sink: S,
    stats: CatchupStats,
}

impl<H: DayBoundaryHandler, S: SampleSink> CatchupSequencer<H, S> {
    pub fn new(config: RolloverConfig, handler: H, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            limits: PlausibilityLimits::default(),
            daylight: Box::new(LocalDaylight),
            state: RolloverState::default(),
            primed: false,
            last: None,
            handler,
            sink,
            stats: CatchupStats::default(),
        })
    }

    pub fn with_daylight(mut self, probe: impl DaylightProbe + 'static) -> Self {
        self.daylight = Box::new(probe);
        self
    }

    pub fn with_limits(mut self, limits: PlausibilityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Continue from the last record processed in an earlier run.
    ///
    /// Its hour counts as the previously observed hour, so a boundary it
    /// already sat in does not fire again.
    pub fn resume_from(&mut self, last_processed: NaiveDateTime) {
        self.prime(last_processed);
        self.last = Some(last_processed);
    }

    fn prime(&mut self, at: NaiveDateTime) {
        let roll = roll_hour(&self.config, at, self.daylight.as_ref());
        self.state = RolloverState::primed(at.hour(), roll, self.config.snow_hour);
        self.primed = true;
        debug!(at = %at, roll_hour = roll, state = ?self.state, "rollover state primed");
    }

    /// Apply one archive record.
    pub fn process(&mut self, record: &ArchiveRecord) -> Result<BoundaryEvents> {
        self.apply(record)
    }

    /// Apply one live pseudo-record through the same state.
    pub fn process_live(&mut self, record: &ArchiveRecord) -> Result<BoundaryEvents> {
        let events = self.apply(record)?;
        self.stats.live_records += 1;
        Ok(events)
    }

    /// Apply records until the source ends or fails.
    ///
    /// Out-of-order records are skipped; a failing source stops the run.
    /// Returns the number of records applied.
    pub fn run<I, E>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = std::result::Result<ArchiveRecord, E>>,
        CatchupError: From<E>,
    {
        let mut applied = 0;
        for record in records {
            let record = record?;
            match self.process(&record) {
                Ok(_) => applied += 1,
                Err(err @ CatchupError::OutOfOrder { .. }) => {
                    warn!(error = %err, "skipping archive record");
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            applied,
            last = ?self.last,
            rollovers = self.stats.rollovers,
            "catch-up run finished"
        );
        Ok(applied)
    }

    fn apply(&mut self, record: &ArchiveRecord) -> Result<BoundaryEvents> {
        let at = record.timestamp;
        if let Some(previous) = self.last {
            if at <= previous {
                self.stats.out_of_order += 1;
                return Err(CatchupError::OutOfOrder { previous, got: at });
            }
        }

        let events = if self.primed {
            let roll = roll_hour(&self.config, at, self.daylight.as_ref());
            self.state.advance(at.hour(), roll, self.config.snow_hour)
        } else {
            self.prime(at);
            BoundaryEvents::default()
        };
        self.fire(&events, record);
        self.forward(record);

        self.last = Some(at);
        self.stats.records += 1;
        Ok(events)
    }

    fn fire(&mut self, events: &BoundaryEvents, record: &ArchiveRecord) {
        if events.rollover {
            info!(at = %record.timestamp, "day rollover");
            self.stats.rollovers += 1;
            self.handler.on_day_rollover(record);
        }
        if events.midnight {
            debug!(at = %record.timestamp, "midnight rain reset");
            self.stats.midnights += 1;
            self.handler.on_midnight(record);
        }
        if events.nine_am {
            debug!(at = %record.timestamp, "9 am boundary");
            self.stats.nine_ams += 1;
            self.handler.on_nine_am(record);
        }
        if events.snow_hour {
            debug!(at = %record.timestamp, "snow hour");
            self.stats.snow_hours += 1;
            self.handler.on_snow_hour(record);
        }
    }

    fn admit(&mut self, name: &'static str, value: Option<f64>, range: &RangeInclusive<f64>) -> Option<f64> {
        let value = match value {
            Some(value) => value,
            None => {
                self.stats.missing += 1;
                return None;
            }
        };
        if !range.contains(&value) {
            self.stats.implausible += 1;
            warn!(reading = name, value, "implausible reading skipped");
            return None;
        }
        Some(value)
    }

    fn in_range(value: Option<f64>, range: &RangeInclusive<f64>) -> Option<f64> {
        value.filter(|v| range.contains(v))
    }

    fn forward(&mut self, record: &ArchiveRecord) {
        let at = record.timestamp;
        let limits = self.limits.clone();

        let humidity = self
            .admit("humidity", record.outside_humidity.map(f64::from), &limits.humidity)
            .and(record.outside_humidity);
        let temp = self.admit("temperature", record.outside_temp_f, &limits.temperature_f);
        let wind = self.admit("wind", record.wind_avg_mph, &limits.wind_mph);
        let rain = self
            .admit("rain", record.rain_clicks.map(f64::from), &limits.rain_clicks)
            .and(record.rain_clicks);
        let pressure = self.admit("pressure", record.barometer_inhg, &limits.barometer_inhg);
        let uv = self.admit("uv", record.uv_index, &limits.uv_index);
        let solar = self
            .admit("solar", record.solar_wm2.map(f64::from), &limits.solar_wm2)
            .and(record.solar_wm2);
        let et = self.admit("et", record.et_in, &limits.et_in);

        if let Some(humidity) = humidity {
            self.sink.apply(at, Sample::Humidity(humidity));
        }
        if let Some(avg_f) = temp {
            self.sink.apply(
                at,
                Sample::Temperature {
                    avg_f,
                    high_f: Self::in_range(record.high_temp_f, &limits.temperature_f),
                    low_f: Self::in_range(record.low_temp_f, &limits.temperature_f),
                },
            );
        }
        if let (Some(temp_f), Some(humidity)) = (temp, humidity) {
            self.sink.apply(at, Sample::DewPoint { temp_f, humidity });
        }
        if let Some(temp_f) = temp {
            self.sink.apply(at, Sample::WindChill { temp_f, wind_mph: wind });
        }
        if let Some(avg_mph) = wind {
            self.sink.apply(
                at,
                Sample::Wind {
                    avg_mph,
                    gust_mph: Self::in_range(record.wind_high_mph, &limits.wind_mph),
                    dir_deg: record.wind_dir_deg,
                },
            );
        }
        if let Some(clicks) = rain {
            self.sink.apply(
                at,
                Sample::Rain {
                    clicks,
                    rate_high_clicks: record.rain_rate_high_clicks,
                },
            );
        }
        if let Some(inhg) = pressure {
            self.sink.apply(at, Sample::Pressure(inhg));
        }
        if let Some(index) = uv {
            self.sink.apply(at, Sample::Uv(index));
        }
        if let Some(wm2) = solar {
            self.sink.apply(at, Sample::Solar(wm2));
        }
        if let Some(inches) = et {
            self.sink.apply(at, Sample::Et(inches));
        }
        self.forward_extra(record, &limits);
        self.sink.record_done(record);
    }

    fn forward_extra(&mut self, record: &ArchiveRecord, limits: &PlausibilityLimits) {
        let at = record.timestamp;
        let extra = &record.extra;
        let humid = |h: &Option<u8>| h.filter(|h| limits.humidity.contains(&f64::from(*h)));

        for (channel, temp) in extra.extra_temps_f.iter().enumerate() {
            if let Some(temp_f) = Self::in_range(*temp, &limits.temperature_f) {
                self.sink.apply(at, Sample::ExtraTemperature { channel, temp_f });
            }
        }
        for (channel, humidity) in extra.extra_humidities.iter().enumerate() {
            if let Some(humidity) = humid(humidity) {
                self.sink.apply(at, Sample::ExtraHumidity { channel, humidity });
            }
        }
        for (channel, temp) in extra.soil_temps_f.iter().enumerate() {
            if let Some(temp_f) = Self::in_range(*temp, &limits.temperature_f) {
                self.sink.apply(at, Sample::SoilTemperature { channel, temp_f });
            }
        }
        for (channel, moisture) in extra.soil_moistures_cb.iter().enumerate() {
            if let Some(centibars) = *moisture {
                self.sink.apply(at, Sample::SoilMoisture { channel, centibars });
            }
        }
        for (channel, temp) in extra.leaf_temps_f.iter().enumerate() {
            if let Some(temp_f) = Self::in_range(*temp, &limits.temperature_f) {
                self.sink.apply(at, Sample::LeafTemperature { channel, temp_f });
            }
        }
        for (channel, wetness) in extra.leaf_wetness.iter().enumerate() {
            if let Some(wetness) = *wetness {
                self.sink.apply(at, Sample::LeafWetness { channel, wetness });
            }
        }
    }

    pub fn state(&self) -> &RolloverState {
        &self.state
    }

    pub fn config(&self) -> &RolloverConfig {
        &self.config
    }

    /// Timestamp of the last record applied (or resumed from).
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last
    }

    pub fn stats(&self) -> &CatchupStats {
        &self.stats
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (H, S) {
        (self.handler, self.sink)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use wxconsole_frame::{decode_archive_record, ArchiveFormat, ArchiveRecordBuilder};

    use super::*;
    use crate::daylight::NoDaylight;

    #[derive(Default)]
    struct Journal {
        events: Vec<String>,
    }

    impl DayBoundaryHandler for Journal {
        fn on_day_rollover(&mut self, record: &ArchiveRecord) {
            self.events.push(format!("rollover {}", record.timestamp.format("%H:%M")));
        }

        fn on_midnight(&mut self, record: &ArchiveRecord) {
            self.events.push(format!("midnight {}", record.timestamp.format("%H:%M")));
        }

        fn on_nine_am(&mut self, record: &ArchiveRecord) {
            self.events.push(format!("nine {}", record.timestamp.format("%H:%M")));
        }

        fn on_snow_hour(&mut self, record: &ArchiveRecord) {
            self.events.push(format!("snow {}", record.timestamp.format("%H:%M")));
        }
    }

    #[derive(Default)]
    struct Samples {
        applied: Vec<&'static str>,
    }

    impl SampleSink for Samples {
        fn apply(&mut self, _at: NaiveDateTime, sample: Sample) {
            self.applied.push(sample.name());
        }
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(ts: NaiveDateTime) -> ArchiveRecord {
        let slot = ArchiveRecordBuilder::new(ArchiveFormat::VantageRevB, ts)
            .temperature(60.0, 61.0, 59.0)
            .humidity(70)
            .wind(3.0, 8.0, 90.0, 90.0)
            .rain(0, 0)
            .barometer(30.0)
            .solar(200)
            .uv(1.0)
            .et(0.001)
            .build();
        decode_archive_record(&slot, ArchiveFormat::VantageRevB, 5)
            .unwrap()
            .unwrap()
    }

    fn sequencer(config: RolloverConfig) -> CatchupSequencer<Journal, Samples> {
        CatchupSequencer::new(config, Journal::default(), Samples::default())
            .unwrap()
            .with_daylight(NoDaylight)
    }

    #[test]
    fn rollover_fires_once_on_first_record_of_the_hour() {
        let mut seq = sequencer(RolloverConfig::default());
        let times = [at(1, 23, 55), at(1, 23, 58), at(2, 0, 0), at(2, 0, 2)];
        let fired: Vec<bool> = times
            .iter()
            .map(|&ts| seq.process(&record(ts)).unwrap().rollover)
            .collect();
        assert_eq!(fired, vec![false, false, true, false]);
        assert_eq!(seq.stats().rollovers, 1);
    }

    #[test]
    fn fresh_sequencer_does_not_fire_on_first_record() {
        let mut seq = sequencer(RolloverConfig::default());
        let events = seq.process(&record(at(2, 0, 5))).unwrap();
        assert!(!events.any());
        assert!(seq.state().rollover_done);
    }

    #[test]
    fn resumed_sequencer_fires_on_the_boundary() {
        let mut seq = sequencer(RolloverConfig {
            rollover_hour: 0,
            use_10am_in_summer: false,
            snow_hour: 0,
        });
        seq.resume_from(at(1, 23, 55));
        for minute in [0, 5, 10] {
            seq.process(&record(at(2, 0, minute))).unwrap();
        }
        assert_eq!(
            seq.handler().events,
            vec!["rollover 00:00", "midnight 00:00", "snow 00:00"]
        );
    }

    #[test]
    fn resume_inside_the_boundary_hour_does_not_refire() {
        let mut seq = sequencer(RolloverConfig::default());
        seq.resume_from(at(2, 0, 5));
        seq.process(&record(at(2, 0, 10))).unwrap();
        assert!(seq.handler().events.is_empty());
    }

    #[test]
    fn out_of_order_record_is_refused() {
        let mut seq = sequencer(RolloverConfig::default());
        seq.process(&record(at(1, 10, 0))).unwrap();
        let err = seq.process(&record(at(1, 10, 0))).unwrap_err();
        assert!(matches!(err, CatchupError::OutOfOrder { .. }));
        assert_eq!(seq.stats().records, 1);
        assert_eq!(seq.sink().applied.iter().filter(|s| **s == "humidity").count(), 1);
    }

    #[test]
    fn readings_forwarded_in_fixed_order() {
        let mut seq = sequencer(RolloverConfig::default());
        seq.process(&record(at(1, 12, 0))).unwrap();
        assert_eq!(
            seq.sink().applied,
            vec![
                "humidity",
                "temperature",
                "dewpoint",
                "windchill",
                "wind",
                "rain",
                "pressure",
                "uv",
                "solar",
                "et"
            ]
        );
    }

    #[test]
    fn missing_and_implausible_readings_are_skipped() {
        let mut seq = sequencer(RolloverConfig::default());
        let mut rec = record(at(1, 12, 0));
        rec.outside_humidity = None;
        rec.barometer_inhg = Some(12.0);
        seq.process(&rec).unwrap();

        let applied = &seq.sink().applied;
        assert!(!applied.contains(&"humidity"));
        assert!(!applied.contains(&"dewpoint"));
        assert!(!applied.contains(&"pressure"));
        assert!(applied.contains(&"windchill"));
        assert_eq!(seq.stats().missing, 1);
        assert_eq!(seq.stats().implausible, 1);
    }

    #[test]
    fn live_records_share_rollover_state() {
        let mut seq = sequencer(RolloverConfig::default());
        seq.resume_from(at(1, 23, 50));
        seq.process(&record(at(2, 0, 0))).unwrap();
        let live = record(at(2, 0, 1));
        assert!(!seq.process_live(&live).unwrap().rollover);
        assert_eq!(seq.stats().rollovers, 1);
        assert_eq!(seq.stats().live_records, 1);
    }

    #[test]
    fn run_skips_out_of_order_and_stops_on_source_error() {
        let mut seq = sequencer(RolloverConfig::default());
        let base = at(1, 8, 0);
        let records: Vec<std::result::Result<ArchiveRecord, CatchupError>> = vec![
            Ok(record(base)),
            Ok(record(base - TimeDelta::minutes(5))),
            Ok(record(base + TimeDelta::minutes(5))),
        ];
        assert_eq!(seq.run(records).unwrap(), 2);
        assert_eq!(seq.stats().out_of_order, 1);

        let failing: Vec<std::result::Result<ArchiveRecord, CatchupError>> =
            vec![Err(CatchupError::InvalidConfig("boom".into()))];
        assert!(seq.run(failing).is_err());
    }

    #[test]
    fn summer_rollover_moves_to_ten() {
        let config = RolloverConfig {
            rollover_hour: 9,
            use_10am_in_summer: true,
            snow_hour: 9,
        };
        let mut seq = CatchupSequencer::new(config, Journal::default(), Samples::default())
            .unwrap()
            .with_daylight(|_: NaiveDateTime| true);
        seq.resume_from(at(1, 8, 55));
        for (h, m) in [(9, 0), (9, 30), (10, 0), (10, 5)] {
            seq.process(&record(at(1, h, m))).unwrap();
        }
        assert_eq!(seq.handler().events, vec!["nine 09:00", "snow 09:00", "rollover 10:00"]);
    }
}
