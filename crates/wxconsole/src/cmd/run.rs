use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};
use wxconsole::catchup::{DayBoundaryHandler, Sample, SampleSink};
use wxconsole::frame::ArchiveRecord;
use wxconsole::session::ConsoleSession;
use wxconsole::transport::{ShutdownSignal, Transport};
use wxconsole::{Station, StationConfig, StationOptions, StationStatus};

use crate::cmd::{install_ctrlc_handler, parse_duration, simulated_console, RunArgs};
use crate::exit::{station_error, CliResult, SUCCESS};
use crate::output::{opt, print_summary, timestamp, OutputFormat};

const STATUS_POLL: Duration = Duration::from_millis(250);

/// Logs each day boundary.
struct LoggedBoundaries;

impl DayBoundaryHandler for LoggedBoundaries {
    fn on_day_rollover(&mut self, record: &ArchiveRecord) {
        info!(at = %record.timestamp, "end of meteorological day");
    }

    fn on_midnight(&mut self, record: &ArchiveRecord) {
        info!(at = %record.timestamp, "midnight");
    }

    fn on_nine_am(&mut self, record: &ArchiveRecord) {
        info!(at = %record.timestamp, "9 am");
    }

    fn on_snow_hour(&mut self, record: &ArchiveRecord) {
        info!(at = %record.timestamp, "snow observation hour");
    }
}

/// Counts readings and logs them at debug level.
#[derive(Default)]
struct CountedSamples {
    samples: usize,
}

impl SampleSink for CountedSamples {
    fn apply(&mut self, at: NaiveDateTime, sample: Sample) {
        self.samples += 1;
        debug!(at = %at, reading = sample.name(), sample = ?sample, "reading");
    }
}

#[derive(Serialize)]
struct RunSummary {
    records: usize,
    live_records: usize,
    samples: usize,
    rollovers: usize,
    catchups: u32,
    ticks: u32,
    skipped_ticks: u32,
    last: Option<String>,
    peak_gust_mph: Option<f64>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = match &args.config {
        Some(path) => StationConfig::load(path).map_err(|err| station_error("config", err))?,
        None => StationConfig::default(),
    };
    let limit = args.duration.as_deref().map(parse_duration).transpose()?;

    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(&shutdown)?;

    let session: ConsoleSession<Box<dyn Transport>> = if args.simulate {
        let sim = simulated_console(&shutdown, config.loop_kind.into());
        ConsoleSession::new(Box::new(sim), config.session_config(&shutdown))
    } else {
        config
            .open_session(&shutdown)
            .map_err(|err| station_error("open failed", err))?
    };
    let sequencer = config
        .sequencer(LoggedBoundaries, CountedSamples::default())
        .map_err(|err| station_error("config", err))?;

    info!(endpoint = session.transport().endpoint(), "starting station");
    let station = Station::start(session, sequencer, StationOptions::from(&config))
        .map_err(|err| station_error("start failed", err))?;

    wait(&station, &shutdown, limit);

    let report = station.stop().map_err(|err| station_error("stop failed", err))?;
    let summary = RunSummary {
        records: report.stats.records,
        live_records: report.stats.live_records,
        samples: report.sink.samples,
        rollovers: report.stats.rollovers,
        catchups: report.catchups,
        ticks: report.ticks,
        skipped_ticks: report.skipped_ticks,
        last: report.last_timestamp.map(timestamp),
        peak_gust_mph: report.peak_gust.map(|gust| gust.speed_mph),
    };
    print_summary(
        &summary,
        &[
            ("records", format!("{} ({} live)", summary.records, summary.live_records)),
            ("samples", summary.samples.to_string()),
            ("rollovers", summary.rollovers.to_string()),
            ("catch-ups", summary.catchups.to_string()),
            ("ticks", format!("{} ({} skipped)", summary.ticks, summary.skipped_ticks)),
            ("last", summary.last.clone().unwrap_or_else(|| "-".to_string())),
            ("peak gust", opt(summary.peak_gust_mph)),
        ],
        format,
    );
    Ok(SUCCESS)
}

/// Block until Ctrl-C or `limit`, logging status changes.
fn wait<T, H, S>(station: &Station<T, H, S>, shutdown: &ShutdownSignal, limit: Option<Duration>)
where
    T: Transport + 'static,
    H: DayBoundaryHandler + Send + 'static,
    S: SampleSink + Send + 'static,
{
    let started = std::time::Instant::now();
    let mut last = StationStatus::Starting;
    loop {
        if shutdown.sleep(STATUS_POLL).is_err() {
            info!("interrupted; stopping station");
            return;
        }
        let status = station.status();
        if status != last {
            info!(status = ?status, "station status");
            last = status;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            info!("run duration reached; stopping station");
            return;
        }
    }
}
