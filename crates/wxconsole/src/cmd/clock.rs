use chrono::Local;
use serde::Serialize;
use wxconsole::frame::LoopKind;
use wxconsole::session::SessionConfig;
use wxconsole::transport::ShutdownSignal;

use crate::cmd::{open_console, parse_duration, ClockArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_summary, OutputFormat};

#[derive(Serialize)]
struct ClockReport {
    console_time: String,
    host_time: String,
    drift_secs: i64,
    firmware: Option<String>,
    corrected: bool,
}

pub fn run(args: ClockArgs, format: OutputFormat) -> CliResult<i32> {
    let max_drift = parse_duration(&args.max_drift)?;
    let config = SessionConfig {
        shutdown: ShutdownSignal::new(),
        ..SessionConfig::default()
    };
    let mut session = open_console(&args.console, config, LoopKind::Loop)?;

    let firmware = session.firmware_version().ok();
    let console_time = session
        .console_time()
        .map_err(|err| session_error("GETTIME failed", err))?;
    let host_time = Local::now().naive_local();

    let corrected = if args.sync {
        session
            .sync_clock(host_time, max_drift)
            .map_err(|err| session_error("clock sync failed", err))?
            .is_some()
    } else {
        false
    };

    let report = ClockReport {
        console_time: console_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        host_time: host_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        drift_secs: (host_time - console_time).num_seconds(),
        firmware,
        corrected,
    };
    print_summary(
        &report,
        &[
            ("console", report.console_time.clone()),
            ("host", report.host_time.clone()),
            ("drift", format!("{}s", report.drift_secs)),
            ("firmware", report.firmware.clone().unwrap_or_else(|| "-".to_string())),
            ("corrected", report.corrected.to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
