use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use clap::{Args, Subcommand, ValueEnum};
use wxconsole::frame::{ArchiveFormat, ArchiveRecordBuilder, LoopFrameBuilder, LoopKind};
use wxconsole::session::{ConsoleSession, SessionConfig, SimulatedConsole};
use wxconsole::transport::{Endpoint, ShutdownSignal, Transport, TransportConfig};

use crate::exit::{session_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod catchup;
pub mod clock;
pub mod dump;
pub mod live;
pub mod run;
pub mod version;

/// Hours of archive history the simulator starts with.
const SIM_HISTORY_HOURS: i64 = 6;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll current conditions (LOOP / LOOP2).
    Live(LiveArgs),
    /// Download archive records logged after a point in time.
    Dump(DumpArgs),
    /// Replay archive records through the catch-up sequencer.
    Catchup(CatchupArgs),
    /// Show, and optionally correct, the console clock.
    Clock(ClockArgs),
    /// Run the station worker from a config file until interrupted.
    Run(RunArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Live(args) => live::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Catchup(args) => catchup::run(args, format),
        Command::Clock(args) => clock::run(args, format),
        Command::Run(args) => run::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    /// Console endpoint: tcp:HOST:PORT, serial:PATH[@BAUD] or a device path.
    #[arg(required_unless_present = "simulate")]
    pub endpoint: Option<String>,
    /// Talk to the built-in console simulator instead of a real console.
    #[arg(long, conflicts_with = "endpoint")]
    pub simulate: bool,
    /// Wait for each command acknowledgement (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub ack_timeout: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LayoutArg {
    RevA,
    RevB,
    Wll,
    ConsoleIss,
}

impl From<LayoutArg> for ArchiveFormat {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::RevA => ArchiveFormat::VantageRevA,
            LayoutArg::RevB => ArchiveFormat::VantageRevB,
            LayoutArg::Wll => ArchiveFormat::WllIss,
            LayoutArg::ConsoleIss => ArchiveFormat::ConsoleIss,
        }
    }
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    #[command(flatten)]
    pub console: ConsoleArgs,
    /// Number of frames to read.
    #[arg(long, short = 'n', default_value = "10")]
    pub count: u16,
    /// Request LOOP2 frames instead of LOOP.
    #[arg(long)]
    pub loop2: bool,
    /// Maximum silence between two frames (e.g. 3s).
    #[arg(long, default_value = "3s")]
    pub watchdog: String,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub console: ConsoleArgs,
    /// Only records after this console-local time ("YYYY-MM-DD HH:MM"). Default: 24 hours ago.
    #[arg(long)]
    pub since: Option<String>,
    /// Decode every slot with this layout instead of detecting it.
    #[arg(long, value_name = "LAYOUT")]
    pub layout: Option<LayoutArg>,
    /// Archive interval in minutes for layouts that do not store one.
    #[arg(long)]
    pub interval: Option<u16>,
    /// Attempts per archive page before the download is abandoned.
    #[arg(long, default_value = "4")]
    pub page_retries: u32,
}

#[derive(Args, Debug)]
pub struct CatchupArgs {
    #[command(flatten)]
    pub dump: DumpArgs,
    /// Hour the meteorological day rolls over (0 or 9).
    #[arg(long, default_value = "0")]
    pub rollover_hour: u32,
    /// With a 9 am rollover, roll at 10 am during daylight saving time.
    #[arg(long)]
    pub summer_10am: bool,
    /// Hour of the daily snow observation.
    #[arg(long, default_value = "9")]
    pub snow_hour: u32,
    /// Treat --since as the last record already processed.
    #[arg(long, requires = "since")]
    pub resume: bool,
}

#[derive(Args, Debug)]
pub struct ClockArgs {
    #[command(flatten)]
    pub console: ConsoleArgs,
    /// Set the console clock to host time when it drifts more than --max-drift.
    #[arg(long)]
    pub sync: bool,
    /// Drift tolerated before --sync corrects the clock (e.g. 30s).
    #[arg(long, default_value = "60s")]
    pub max_drift: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Station config file (JSON).
    #[arg(long, short = 'c', value_name = "FILE", required_unless_present = "simulate")]
    pub config: Option<PathBuf>,
    /// Run against the built-in console simulator.
    #[arg(long)]
    pub simulate: bool,
    /// Stop after this long (e.g. 90s). Default: until Ctrl-C.
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

/// Open a session to the console named by `args`, or to a fresh simulator.
pub fn open_console(
    args: &ConsoleArgs,
    config: SessionConfig,
    kind: LoopKind,
) -> CliResult<ConsoleSession<Box<dyn Transport>>> {
    let shutdown = config.shutdown.clone();
    let transport: Box<dyn Transport> = if args.simulate {
        Box::new(simulated_console(&shutdown, kind))
    } else {
        let endpoint: Endpoint = args
            .endpoint
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|err| transport_error("invalid endpoint", err))?;
        let transport_config = TransportConfig {
            shutdown,
            ..TransportConfig::default()
        };
        endpoint
            .open(transport_config)
            .map_err(|err| transport_error("open failed", err))?
    };

    let config = SessionConfig {
        ack_timeout: parse_duration(&args.ack_timeout)?,
        ..config
    };
    let mut session = ConsoleSession::new(transport, config);
    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;
    Ok(session)
}

/// A simulator with a few hours of archive history and live readings.
pub fn simulated_console(shutdown: &ShutdownSignal, kind: LoopKind) -> SimulatedConsole {
    let now = Local::now().naive_local();
    let sim = SimulatedConsole::new().with_shutdown(shutdown.clone());
    sim.set_clock(now);

    let newest = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .and_then(|t| t.with_minute(t.minute() - t.minute() % 5))
        .unwrap_or(now);
    let start = newest - TimeDelta::hours(SIM_HISTORY_HOURS);
    let slots = (0..=SIM_HISTORY_HOURS * 12).map(|i| {
        let wave = (i % 24) as f64;
        ArchiveRecordBuilder::new(ArchiveFormat::VantageRevB, start + TimeDelta::minutes(5 * i))
            .temperature(58.0 + wave * 0.25, 58.5 + wave * 0.25, 57.5 + wave * 0.25)
            .humidity(62 - (i % 10) as u8)
            .inside(70.5, 41)
            .wind(4.0 + wave * 0.5, 9.0 + wave, 225.0, 202.5)
            .rain((i % 7 == 0) as u16, 0)
            .barometer(29.92 + wave * 0.002)
            .solar(if wave > 6.0 { 350 } else { 0 })
            .uv(if wave > 6.0 { 2.1 } else { 0.0 })
            .build()
    });
    sim.push_archive(slots);

    let mut live = LoopFrameBuilder::new(kind)
        .barometer_inhg(29.98)
        .inside(70.7, 41)
        .outside_temp_f(61.3)
        .outside_humidity(57)
        .wind(6, 210)
        .rain_rate_clicks(0)
        .day_rain_clicks(4)
        .solar(380)
        .uv(2.4);
    if kind == LoopKind::Loop2 {
        live = live.gust_10min(14, 240);
    }
    sim.set_live(live);
    sim
}

/// Parse "500ms", "5s" or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

/// Parse a console-local "YYYY-MM-DD HH:MM" (or with seconds, or a `T`).
pub fn parse_since(input: &str) -> CliResult<NaiveDateTime> {
    let input = input.trim();
    ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or_else(|| CliError::new(USAGE, format!("invalid time '{input}', expected YYYY-MM-DD HH:MM")))
}

/// The `--since` time, defaulting to 24 hours before the host clock.
pub fn since_or_default(since: Option<&str>) -> CliResult<NaiveDateTime> {
    match since {
        Some(since) => parse_since(since),
        None => Ok(Local::now().naive_local() - TimeDelta::hours(24)),
    }
}

/// Trigger `shutdown` on Ctrl-C.
pub fn install_ctrlc_handler(shutdown: &ShutdownSignal) -> CliResult<()> {
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || shutdown.trigger()).map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
