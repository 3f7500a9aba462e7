use chrono::Local;
use serde::Serialize;
use wxconsole::frame::LoopKind;
use wxconsole::session::{request_loop, GustTracker, LoopAbort, LoopOutcome, SessionConfig};
use wxconsole::transport::ShutdownSignal;

use crate::cmd::{install_ctrlc_handler, open_console, parse_duration, LiveArgs};
use crate::exit::{session_error, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{opt, print_row, print_rows, print_summary, LoopRow, OutputFormat};

#[derive(Serialize)]
struct LiveSummary {
    requested: u16,
    delivered: u16,
    dropped: u16,
    resyncs: u16,
    aborted: Option<String>,
    peak_gust_mph: Option<f64>,
    peak_gust_dir_deg: Option<u16>,
    kind: &'static str,
}

pub fn run(args: LiveArgs, format: OutputFormat) -> CliResult<i32> {
    let shutdown = ShutdownSignal::new();
    install_ctrlc_handler(&shutdown)?;

    let kind = if args.loop2 { LoopKind::Loop2 } else { LoopKind::Loop };
    let config = SessionConfig {
        loop_watchdog: parse_duration(&args.watchdog)?,
        shutdown,
        ..SessionConfig::default()
    };
    let mut session = open_console(&args.console, config, kind)?;

    let mut batch = request_loop(&mut session, kind, args.count)
        .map_err(|err| session_error("LOOP request failed", err))?;
    let mut gusts = GustTracker::new();
    let mut rows = Vec::new();
    for record in batch.by_ref() {
        let received = Local::now().naive_local();
        gusts.observe(&record, received);
        let row = LoopRow::new(&record, received);
        print_row(&row, format);
        rows.push(row);
    }
    let outcome = batch.outcome().clone();
    drop(batch);

    if format == OutputFormat::Table {
        print_rows(&rows, format);
    }
    if format != OutputFormat::Json {
        let peak = gusts.peak();
        let summary = LiveSummary {
            requested: outcome.requested,
            delivered: outcome.delivered,
            dropped: outcome.dropped,
            resyncs: outcome.resyncs,
            aborted: outcome.aborted.as_ref().map(|reason| format!("{reason:?}")),
            peak_gust_mph: peak.map(|gust| gust.speed_mph),
            peak_gust_dir_deg: peak.and_then(|gust| gust.dir_deg),
            kind: if args.loop2 { "LOOP2" } else { "LOOP" },
        };
        print_summary(
            &summary,
            &[
                ("delivered", format!("{}/{}", summary.delivered, summary.requested)),
                ("dropped", summary.dropped.to_string()),
                ("resyncs", summary.resyncs.to_string()),
                ("aborted", opt(summary.aborted.clone())),
                ("peak gust", opt(summary.peak_gust_mph)),
            ],
            format,
        );
    }

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &LoopOutcome) -> i32 {
    match &outcome.aborted {
        None => SUCCESS,
        Some(LoopAbort::Watchdog) => TIMEOUT,
        Some(LoopAbort::Resync) => DATA_INVALID,
        Some(LoopAbort::Transport(_)) => TRANSPORT_ERROR,
        Some(LoopAbort::Shutdown) => FAILURE,
    }
}
