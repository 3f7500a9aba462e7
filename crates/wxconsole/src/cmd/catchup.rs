use chrono::NaiveDateTime;
use serde::Serialize;
use wxconsole::catchup::{CatchupSequencer, DayBoundaryHandler, RolloverConfig, Sample, SampleSink};
use wxconsole::frame::ArchiveRecord;
use wxconsole::session::{download_since, DownloadOptions};
use wxconsole::transport::ShutdownSignal;

use crate::cmd::dump::{open, resolve_interval};
use crate::cmd::{install_ctrlc_handler, since_or_default, CatchupArgs};
use crate::exit::{catchup_error, session_error, CliResult, SUCCESS};
use crate::output::{print_rows, print_summary, timestamp, ArchiveRow, BoundaryRow, OutputFormat, Row};

/// Records every boundary as it fires.
#[derive(Default)]
struct BoundaryLog {
    rows: Vec<BoundaryRow>,
}

impl BoundaryLog {
    fn push(&mut self, record: &ArchiveRecord, boundary: &'static str) {
        self.rows.push(BoundaryRow {
            timestamp: timestamp(record.timestamp),
            boundary,
        });
    }
}

impl DayBoundaryHandler for BoundaryLog {
    fn on_day_rollover(&mut self, record: &ArchiveRecord) {
        self.push(record, "rollover");
    }

    fn on_midnight(&mut self, record: &ArchiveRecord) {
        self.push(record, "midnight");
    }

    fn on_nine_am(&mut self, record: &ArchiveRecord) {
        self.push(record, "9am");
    }

    fn on_snow_hour(&mut self, record: &ArchiveRecord) {
        self.push(record, "snow-hour");
    }
}

/// Counts forwarded readings and keeps the applied records for `--format pretty`.
#[derive(Default)]
struct Applied {
    samples: usize,
    records: Vec<ArchiveRow>,
}

impl SampleSink for Applied {
    fn apply(&mut self, _at: NaiveDateTime, _sample: Sample) {
        self.samples += 1;
    }

    fn record_done(&mut self, record: &ArchiveRecord) {
        self.records.push(ArchiveRow::from(record));
    }
}

#[derive(Serialize)]
struct CatchupSummary {
    since: String,
    resumed: bool,
    applied: usize,
    samples: usize,
    missing: usize,
    implausible: usize,
    last: Option<String>,
    boundaries: Vec<BoundaryRow>,
}

pub fn run(args: CatchupArgs, format: OutputFormat) -> CliResult<i32> {
    let rollover = RolloverConfig {
        rollover_hour: args.rollover_hour,
        use_10am_in_summer: args.summer_10am,
        snow_hour: args.snow_hour,
    };
    let mut sequencer = CatchupSequencer::new(rollover, BoundaryLog::default(), Applied::default())
        .map_err(|err| catchup_error("invalid rollover settings", err))?;

    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(&shutdown)?;
    let mut session = open(&args.dump, shutdown)?;

    let since = since_or_default(args.dump.since.as_deref())?;
    if args.resume {
        sequencer.resume_from(since);
    }
    let interval = resolve_interval(&mut session, args.dump.interval);
    let mut options = DownloadOptions::new().with_interval(interval);
    if let Some(layout) = args.dump.layout {
        options = options.with_format(layout.into());
    }

    let download =
        download_since(&mut session, since, options).map_err(|err| session_error("DMPAFT failed", err))?;
    let applied = sequencer
        .run(download)
        .map_err(|err| catchup_error("catch-up failed", err))?;

    let stats = *sequencer.stats();
    let last = sequencer.last_timestamp();
    let (boundaries, sink) = sequencer.into_parts();

    if format == OutputFormat::Pretty {
        for row in &sink.records {
            println!("{}", row.pretty());
        }
    }
    if format == OutputFormat::Table {
        print_rows(&boundaries.rows, format);
    }
    let summary = CatchupSummary {
        since: timestamp(since),
        resumed: args.resume,
        applied,
        samples: sink.samples,
        missing: stats.missing,
        implausible: stats.implausible,
        last: last.map(timestamp),
        boundaries: boundaries.rows,
    };
    let fired: Vec<String> = summary
        .boundaries
        .iter()
        .map(|row| format!("{}@{}", row.boundary, row.timestamp))
        .collect();
    print_summary(
        &summary,
        &[
            ("since", summary.since.clone()),
            ("applied", summary.applied.to_string()),
            ("samples", summary.samples.to_string()),
            ("skipped", format!("{} missing, {} implausible", summary.missing, summary.implausible)),
            ("last", summary.last.clone().unwrap_or_else(|| "-".to_string())),
            ("boundaries", fired.join(", ")),
        ],
        format,
    );
    Ok(SUCCESS)
}
