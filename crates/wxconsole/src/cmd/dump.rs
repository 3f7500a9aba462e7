use serde::Serialize;
use tracing::info;
use wxconsole::frame::{ArchiveRecord, LoopKind};
use wxconsole::session::{download_since, ConsoleSession, DownloadOptions, SessionConfig, DEFAULT_INTERVAL_MINUTES};
use wxconsole::transport::{ShutdownSignal, Transport};

use crate::cmd::{install_ctrlc_handler, open_console, since_or_default, DumpArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_row, print_rows, print_summary, timestamp, ArchiveRow, OutputFormat};

#[derive(Serialize)]
struct DumpSummary {
    since: String,
    pages: u16,
    offset: u16,
    records: usize,
}

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(&shutdown)?;
    let mut session = open(&args, shutdown)?;

    let since = since_or_default(args.since.as_deref())?;
    let interval = resolve_interval(&mut session, args.interval);
    let mut options = DownloadOptions::new().with_interval(interval);
    if let Some(layout) = args.layout {
        options = options.with_format(layout.into());
    }

    let mut download =
        download_since(&mut session, since, options).map_err(|err| session_error("DMPAFT failed", err))?;
    let header = download.header();
    let mut rows = Vec::new();
    for record in download.by_ref() {
        let record: ArchiveRecord = record.map_err(|err| session_error("archive download failed", err))?;
        let row = ArchiveRow::from(&record);
        print_row(&row, format);
        rows.push(row);
    }
    drop(download);

    if format == OutputFormat::Table {
        print_rows(&rows, format);
    }
    if format != OutputFormat::Json {
        let summary = DumpSummary {
            since: timestamp(since),
            pages: header.pages,
            offset: header.offset,
            records: rows.len(),
        };
        print_summary(
            &summary,
            &[
                ("since", summary.since.clone()),
                ("pages", summary.pages.to_string()),
                ("records", summary.records.to_string()),
            ],
            format,
        );
    }
    Ok(SUCCESS)
}

pub(crate) fn open(args: &DumpArgs, shutdown: ShutdownSignal) -> CliResult<ConsoleSession<Box<dyn Transport>>> {
    let config = SessionConfig {
        page_retries: args.page_retries.max(1),
        shutdown,
        ..SessionConfig::default()
    };
    open_console(&args.console, config, LoopKind::Loop)
}

/// The `--interval` override, else the console's own setting.
pub(crate) fn resolve_interval(session: &mut ConsoleSession<Box<dyn Transport>>, interval: Option<u16>) -> u16 {
    if let Some(minutes) = interval {
        return minutes;
    }
    match session.archive_interval() {
        Ok(minutes) => minutes,
        Err(err) => {
            info!(error = %err, assumed = DEFAULT_INTERVAL_MINUTES, "archive interval not readable");
            DEFAULT_INTERVAL_MINUTES
        }
    }
}
