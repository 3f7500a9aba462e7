//! One station, one worker thread.
//!
//! The worker first catches up on the archive records the console logged
//! while nobody was listening, then polls live conditions until shut down.
//! Both run through the same [`CatchupSequencer`], so a day boundary
//! handled during catch-up never fires again once live polling starts.
//!
//! The session sits behind a mutex (the gate). Catch-up holds it from the
//! start of the archive download until it is done; a live tick only tries
//! it and is skipped when it is taken, or when the previous tick is still
//! running.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};
use wxconsole_catchup::{BoundaryEvents, CatchupSequencer, CatchupStats, DayBoundaryHandler, SampleSink};
use wxconsole_frame::{LoopKind, LoopRecord};
use wxconsole_session::{
    download_since, request_loop, ConsoleSession, DownloadOptions, FaultClass, Gust, GustTracker, LoopAbort,
    LoopOutcome, SessionError, DEFAULT_INTERVAL_MINUTES,
};
use wxconsole_transport::{ShutdownSignal, Transport};

use crate::config::StationConfig;
use crate::error::{Result, StationError};

/// Source of the timestamps given to live records and clock syncs.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// What the station is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Starting,
    CatchingUp,
    Live,
    /// Too many consecutive transport faults. The worker keeps trying.
    Unreachable,
    Stopped,
}

/// Result of one live tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A LOOP batch was read; `events` are the boundaries its newest frame fired.
    Polled {
        outcome: LoopOutcome,
        events: BoundaryEvents,
    },
    /// Catch-up holds the session, or the previous tick is still running.
    Skipped,
    Failed(FaultClass),
}

/// Station behaviour that is not part of the session itself.
#[derive(Clone)]
pub struct StationOptions {
    pub poll_interval: Duration,
    pub loop_kind: LoopKind,
    pub loop_count: u16,
    /// Archive interval; read from the console when `None`.
    pub archive_interval_minutes: Option<u16>,
    /// Reach of the first catch-up when the sequencer has no resume point.
    pub catchup_window: TimeDelta,
    pub unreachable_after: u32,
    /// Correct console clock drift beyond this before each catch-up.
    pub max_clock_drift: Option<Duration>,
    clock: Clock,
}

impl StationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host clock (console-local wall time).
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }
}

impl Default for StationOptions {
    fn default() -> Self {
        Self::from(&StationConfig::default())
    }
}

impl From<&StationConfig> for StationOptions {
    fn from(config: &StationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            loop_kind: config.loop_kind.into(),
            loop_count: config.loop_count,
            archive_interval_minutes: config.archive_interval_minutes,
            catchup_window: config.catchup_window(),
            unreachable_after: config.unreachable_after,
            max_clock_drift: config.sync_clock.then(|| config.max_clock_drift()),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }
}

impl fmt::Debug for StationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationOptions")
            .field("poll_interval", &self.poll_interval)
            .field("loop_kind", &self.loop_kind)
            .field("loop_count", &self.loop_count)
            .field("archive_interval_minutes", &self.archive_interval_minutes)
            .field("catchup_window", &self.catchup_window)
            .field("unreachable_after", &self.unreachable_after)
            .field("max_clock_drift", &self.max_clock_drift)
            .finish_non_exhaustive()
    }
}

/// Everything handed back by [`Station::stop`].
#[derive(Debug)]
pub struct StationReport<H, S> {
    pub handler: H,
    pub sink: S,
    pub stats: CatchupStats,
    pub last_timestamp: Option<NaiveDateTime>,
    pub peak_gust: Option<Gust>,
    pub catchups: u32,
    pub ticks: u32,
    pub skipped_ticks: u32,
}

/// A running station worker.
///
/// Dropping it without [`stop`](Station::stop) still shuts the worker down.
pub struct Station<T: Transport, H, S> {
    shared: Arc<Shared<T, H, S>>,
    worker: Option<JoinHandle<()>>,
}

impl<T, H, S> Station<T, H, S>
where
    T: Transport + 'static,
    H: DayBoundaryHandler + Send + 'static,
    S: SampleSink + Send + 'static,
{
    /// Spawn the worker. It connects, catches up, then polls live.
    ///
    /// The session's shutdown signal stops the worker.
    pub fn start(
        session: ConsoleSession<T>,
        sequencer: CatchupSequencer<H, S>,
        options: StationOptions,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(session, sequencer, options));
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("wxconsole-station".into())
            .spawn(move || worker_shared.run())
            .map_err(StationError::Spawn)?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn status(&self) -> StationStatus {
        self.shared.status()
    }

    /// Run a live tick now, from any thread.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    /// Catch up again before the next live tick.
    pub fn request_catchup(&self) {
        self.shared.catchup_pending.store(true, Ordering::Release);
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shared.shutdown
    }

    /// Shut the worker down and hand back the collaborators.
    pub fn stop(mut self) -> Result<StationReport<H, S>> {
        self.shared.shutdown.trigger();
        let joined = self.worker.take().map(JoinHandle::join);
        if matches!(joined, Some(Err(_))) {
            return Err(StationError::WorkerPanicked);
        }

        let engine = self.shared.lock_gate().take();
        let Some(engine) = engine else {
            return Err(StationError::WorkerPanicked);
        };
        let stats = *engine.sequencer.stats();
        let last_timestamp = engine.sequencer.last_timestamp();
        let peak_gust = engine.gusts.peak().cloned();
        let (handler, sink) = engine.sequencer.into_parts();
        Ok(StationReport {
            handler,
            sink,
            stats,
            last_timestamp,
            peak_gust,
            catchups: self.shared.catchups.load(Ordering::Acquire),
            ticks: self.shared.ticks.load(Ordering::Acquire),
            skipped_ticks: self.shared.skipped_ticks.load(Ordering::Acquire),
        })
    }
}

impl<T: Transport, H, S> Drop for Station<T, H, S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.shutdown.trigger();
            if worker.join().is_err() {
                warn!("station worker panicked");
            }
        }
    }
}

struct Engine<T: Transport, H, S> {
    session: ConsoleSession<T>,
    sequencer: CatchupSequencer<H, S>,
    gusts: GustTracker,
    day_totals: DayTotals,
    interval: Option<u16>,
}

/// Last day rain and ET totals seen on a live frame.
///
/// The console zeroes both at its own midnight, so a total lower than the
/// previous one counts from zero.
#[derive(Debug, Default)]
struct DayTotals {
    rain_clicks: Option<u16>,
    et_in: Option<f64>,
}

impl DayTotals {
    /// Rain clicks and ET since the previous frame; `None` until a baseline exists.
    fn advance(&mut self, frame: &LoopRecord) -> (Option<u16>, Option<f64>) {
        let rain = match (self.rain_clicks, frame.day_rain_clicks) {
            (Some(prev), Some(now)) if now >= prev => Some(now - prev),
            (Some(_), Some(now)) => Some(now),
            _ => None,
        };
        let et = match (self.et_in, frame.day_et_in) {
            (Some(prev), Some(now)) if now >= prev => Some(now - prev),
            (Some(_), Some(now)) => Some(now),
            _ => None,
        };
        self.rain_clicks = frame.day_rain_clicks;
        self.et_in = frame.day_et_in;
        (rain, et)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

struct Shared<T: Transport, H, S> {
    options: StationOptions,
    shutdown: ShutdownSignal,
    gate: Mutex<Option<Engine<T, H, S>>>,
    ticking: AtomicBool,
    catchup_pending: AtomicBool,
    status: Mutex<StationStatus>,
    transport_faults: AtomicU32,
    catchups: AtomicU32,
    ticks: AtomicU32,
    skipped_ticks: AtomicU32,
}

impl<T, H, S> Shared<T, H, S>
where
    T: Transport,
    H: DayBoundaryHandler,
    S: SampleSink,
{
    fn new(session: ConsoleSession<T>, sequencer: CatchupSequencer<H, S>, options: StationOptions) -> Self {
        Self {
            shutdown: session.shutdown().clone(),
            options,
            gate: Mutex::new(Some(Engine {
                session,
                sequencer,
                gusts: GustTracker::new(),
                day_totals: DayTotals::default(),
                interval: None,
            })),
            ticking: AtomicBool::new(false),
            catchup_pending: AtomicBool::new(true),
            status: Mutex::new(StationStatus::Starting),
            transport_faults: AtomicU32::new(0),
            catchups: AtomicU32::new(0),
            ticks: AtomicU32::new(0),
            skipped_ticks: AtomicU32::new(0),
        }
    }

    fn run(&self) {
        info!(poll_interval = ?self.options.poll_interval, "station worker started");
        while !self.shutdown.is_triggered() {
            if self.catchup_pending.load(Ordering::Acquire) {
                if self.catch_up().is_ok() {
                    self.catchup_pending.store(false, Ordering::Release);
                }
            } else {
                self.tick();
            }
            if self.shutdown.sleep(self.options.poll_interval).is_err() {
                break;
            }
        }
        self.set_status(StationStatus::Stopped);
        info!("station worker stopped");
    }

    fn lock_gate(&self) -> MutexGuard<'_, Option<Engine<T, H, S>>> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> StationStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: StationStatus) {
        let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != status {
            debug!(from = ?*current, to = ?status, "station status");
            *current = status;
        }
    }

    fn catch_up(&self) -> Result<usize> {
        let mut gate = self.lock_gate();
        let Some(engine) = gate.as_mut() else {
            return Ok(0);
        };
        self.set_status(StationStatus::CatchingUp);
        let result = engine.catch_up(&self.options);
        drop(gate);

        match &result {
            Ok(_) => {
                self.catchups.fetch_add(1, Ordering::AcqRel);
                self.note_success();
            }
            Err(err) => self.note_fault(err.fault(), err),
        }
        result
    }

    fn tick(&self) -> TickOutcome {
        if self.ticking.swap(true, Ordering::AcqRel) {
            debug!("previous live tick still running; skipping");
            self.skipped_ticks.fetch_add(1, Ordering::AcqRel);
            return TickOutcome::Skipped;
        }
        let outcome = self.poll_live();
        self.ticking.store(false, Ordering::Release);

        let counter = match outcome {
            TickOutcome::Skipped => &self.skipped_ticks,
            _ => &self.ticks,
        };
        counter.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn poll_live(&self) -> TickOutcome {
        let mut gate = match self.gate.try_lock() {
            Ok(gate) => gate,
            Err(TryLockError::WouldBlock) => {
                debug!("session busy; skipping live tick");
                return TickOutcome::Skipped;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let Some(engine) = gate.as_mut() else {
            return TickOutcome::Skipped;
        };
        let polled = engine.poll(&self.options);
        drop(gate);

        match polled {
            Ok((outcome, events)) => {
                match &outcome.aborted {
                    Some(LoopAbort::Transport(reason)) => self.note_fault(FaultClass::Transport, reason),
                    Some(LoopAbort::Shutdown) => {}
                    _ if outcome.delivered > 0 => self.note_success(),
                    _ => {}
                }
                TickOutcome::Polled { outcome, events }
            }
            Err(err) => {
                let fault = err.fault();
                self.note_fault(fault, &err);
                TickOutcome::Failed(fault)
            }
        }
    }

    fn note_success(&self) {
        let faults = self.transport_faults.swap(0, Ordering::AcqRel);
        if self.status() == StationStatus::Unreachable {
            info!(faults, "console reachable again; catching up");
            self.catchup_pending.store(true, Ordering::Release);
        }
        self.set_status(StationStatus::Live);
    }

    fn note_fault(&self, fault: FaultClass, err: &dyn fmt::Display) {
        match fault {
            FaultClass::Transport => {
                let faults = self.transport_faults.fetch_add(1, Ordering::AcqRel) + 1;
                if faults >= self.options.unreachable_after && self.status() != StationStatus::Unreachable {
                    warn!(faults, error = %err, "console unreachable");
                    self.set_status(StationStatus::Unreachable);
                } else {
                    debug!(faults, error = %err, "transport fault");
                }
            }
            FaultClass::Shutdown => debug!("operation interrupted by shutdown"),
            _ => warn!(fault = ?fault, error = %err, "console operation abandoned"),
        }
    }
}

impl<T, H, S> Engine<T, H, S>
where
    T: Transport,
    H: DayBoundaryHandler,
    S: SampleSink,
{
    fn catch_up(&mut self, options: &StationOptions) -> Result<usize> {
        let now = options.now();
        self.session.connect()?;

        if let Some(max_drift) = options.max_clock_drift {
            match self.session.sync_clock(now, max_drift) {
                Ok(_) => {}
                Err(err) if err.fault() == FaultClass::Protocol => {
                    warn!(error = %err, "console clock not checked");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let interval = self.archive_interval(options)?;
        let since = self
            .sequencer
            .last_timestamp()
            .unwrap_or(now - options.catchup_window);
        let rollovers = self.sequencer.stats().rollovers;

        let download = download_since(
            &mut self.session,
            since,
            DownloadOptions::new()
                .with_interval(interval)
                .on_progress(|progress| {
                    debug!(
                        page = progress.page,
                        pages = progress.pages,
                        records = progress.records,
                        "archive page applied"
                    );
                }),
        )?;
        let applied = self.sequencer.run(download)?;
        // the archive already holds the rain up to now
        self.day_totals.reset();

        if self.sequencer.stats().rollovers > rollovers {
            self.gusts.reset();
        }
        info!(since = %since, applied, "catch-up complete");
        Ok(applied)
    }

    fn archive_interval(&mut self, options: &StationOptions) -> Result<u16> {
        if let Some(minutes) = self.interval {
            return Ok(minutes);
        }
        let minutes = match options.archive_interval_minutes {
            Some(minutes) => minutes,
            None => match self.session.archive_interval() {
                Ok(minutes) => minutes,
                Err(err) if err.fault() == FaultClass::Protocol => {
                    warn!(
                        error = %err,
                        assumed = DEFAULT_INTERVAL_MINUTES,
                        "could not read archive interval"
                    );
                    DEFAULT_INTERVAL_MINUTES
                }
                Err(err) => return Err(err.into()),
            },
        };
        self.interval = Some(minutes);
        Ok(minutes)
    }

    fn poll(&mut self, options: &StationOptions) -> std::result::Result<(LoopOutcome, BoundaryEvents), SessionError> {
        let mut batch = request_loop(&mut self.session, options.loop_kind, options.loop_count)?;
        let frames: Vec<LoopRecord> = batch.by_ref().collect();
        let outcome = batch.outcome().clone();
        drop(batch);

        let Some(newest) = frames.last() else {
            return Ok((outcome, BoundaryEvents::default()));
        };
        let at = options.now();
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL_MINUTES);
        let mut record = newest.to_archive_record(at, interval);
        for frame in &frames {
            let (rain, et) = self.day_totals.advance(frame);
            record.rain_clicks = sum(record.rain_clicks, rain);
            record.et_in = sum(record.et_in, et);
        }
        let events = match self.sequencer.process_live(&record) {
            Ok(events) => events,
            Err(err) => {
                debug!(error = %err, "live record not applied");
                BoundaryEvents::default()
            }
        };
        if events.rollover {
            self.gusts.reset();
        }
        for frame in &frames {
            if self.gusts.observe(frame, at) {
                debug!(peak = ?self.gusts.peak(), "new daily peak gust");
            }
        }
        Ok((outcome, events))
    }
}

fn sum<N: std::ops::Add<Output = N>>(total: Option<N>, delta: Option<N>) -> Option<N> {
    match (total, delta) {
        (Some(total), Some(delta)) => Some(total + delta),
        (total, None) => total,
        (None, delta) => delta,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;
    use std::time::Instant;

    use chrono::NaiveDate;
    use wxconsole_catchup::{NoDaylight, RolloverConfig, Sample};
    use wxconsole_frame::{ArchiveRecord, LoopFrameBuilder};
    use wxconsole_session::{SessionConfig, SimulatedConsole};

    use super::*;

    #[derive(Debug, Default)]
    struct Journal {
        rollovers: Vec<NaiveDateTime>,
    }

    impl DayBoundaryHandler for Journal {
        fn on_day_rollover(&mut self, record: &ArchiveRecord) {
            self.rollovers.push(record.timestamp);
        }
    }

    #[derive(Debug, Default)]
    struct Applied {
        records: Vec<NaiveDateTime>,
        temperatures: usize,
        rain: Vec<u16>,
        et: Vec<f64>,
    }

    impl SampleSink for Applied {
        fn apply(&mut self, _at: NaiveDateTime, sample: Sample) {
            match sample {
                Sample::Temperature { .. } => self.temperatures += 1,
                Sample::Rain { clicks, .. } => self.rain.push(clicks),
                Sample::Et(inches) => self.et.push(inches),
                _ => {}
            }
        }

        fn record_done(&mut self, record: &ArchiveRecord) {
            self.records.push(record.timestamp);
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn ticking_clock(start: NaiveDateTime) -> impl Fn() -> NaiveDateTime + Send + Sync + 'static {
        let seconds = AtomicI64::new(0);
        move || start + TimeDelta::seconds(seconds.fetch_add(1, Ordering::SeqCst))
    }

    fn options(start: NaiveDateTime) -> StationOptions {
        StationOptions {
            poll_interval: Duration::from_millis(5),
            archive_interval_minutes: Some(5),
            unreachable_after: 2,
            ..StationOptions::new()
        }
        .with_clock(ticking_clock(start))
    }

    fn session(sim: &SimulatedConsole) -> ConsoleSession<SimulatedConsole> {
        let config = SessionConfig {
            wake_timeout: Duration::from_millis(10),
            ack_timeout: Duration::from_millis(10),
            page_timeout: Duration::from_millis(10),
            loop_watchdog: Duration::from_millis(10),
            ..SessionConfig::default()
        };
        ConsoleSession::new(sim.clone(), config)
    }

    fn sequencer() -> CatchupSequencer<Journal, Applied> {
        CatchupSequencer::new(RolloverConfig::default(), Journal::default(), Applied::default())
            .unwrap()
            .with_daylight(NoDaylight)
    }

    fn shared(sim: &SimulatedConsole, start: NaiveDateTime) -> Shared<SimulatedConsole, Journal, Applied> {
        Shared::new(session(sim), sequencer(), options(start))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn worker_catches_up_then_polls_live() {
        let sim = SimulatedConsole::new();
        sim.push_archive_times((0..6).map(|i| at(1, 23, 40) + TimeDelta::minutes(5 * i)));

        let station = Station::start(session(&sim), sequencer(), options(at(2, 0, 30))).unwrap();
        assert!(wait_for(|| station.status() == StationStatus::Live));
        assert!(wait_for(|| sim.counters().commands.iter().any(|c| c.starts_with("LOOP"))));

        let report = station.stop().unwrap();
        assert_eq!(report.catchups, 1);
        assert_eq!(report.handler.rollovers, vec![at(2, 0, 0)]);
        assert_eq!(&report.sink.records[..6], &[
            at(1, 23, 40),
            at(1, 23, 45),
            at(1, 23, 50),
            at(1, 23, 55),
            at(2, 0, 0),
            at(2, 0, 5),
        ]);
        assert_eq!(report.stats.records - report.stats.live_records, 6);
        assert!(report.stats.live_records >= 1);
        assert!(report.last_timestamp.unwrap() >= at(2, 0, 30));
    }

    #[test]
    fn tick_is_skipped_while_catch_up_holds_the_gate() {
        let sim = SimulatedConsole::new();
        let shared = shared(&sim, at(2, 12, 0));

        let held = shared.lock_gate();
        assert_eq!(shared.tick(), TickOutcome::Skipped);
        drop(held);

        assert!(matches!(shared.tick(), TickOutcome::Polled { .. }));
        assert_eq!(shared.skipped_ticks.load(Ordering::SeqCst), 1);
        assert_eq!(shared.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overlapping_tick_is_skipped_not_queued() {
        let sim = SimulatedConsole::new();
        let shared = shared(&sim, at(2, 12, 0));

        shared.ticking.store(true, Ordering::SeqCst);
        assert_eq!(shared.tick(), TickOutcome::Skipped);
        assert!(sim.counters().commands.is_empty());

        shared.ticking.store(false, Ordering::SeqCst);
        match shared.tick() {
            TickOutcome::Polled { outcome, .. } => assert_eq!(outcome.delivered, 1),
            other => panic!("unexpected tick outcome {other:?}"),
        }
    }

    #[test]
    fn repeated_transport_faults_mark_station_unreachable() {
        let sim = SimulatedConsole::new();
        let shared = shared(&sim, at(2, 12, 0));
        sim.set_unreachable(true);

        assert_eq!(shared.tick(), TickOutcome::Failed(FaultClass::Transport));
        assert_eq!(shared.status(), StationStatus::Starting);
        assert_eq!(shared.tick(), TickOutcome::Failed(FaultClass::Transport));
        assert_eq!(shared.status(), StationStatus::Unreachable);

        sim.set_unreachable(false);
        shared.catchup_pending.store(false, Ordering::SeqCst);
        assert!(matches!(shared.tick(), TickOutcome::Polled { .. }));
        assert_eq!(shared.status(), StationStatus::Live);
        assert!(shared.catchup_pending.load(Ordering::SeqCst));
    }

    #[test]
    fn live_rollover_resets_daily_gust() {
        let sim = SimulatedConsole::new();
        sim.set_live(LoopFrameBuilder::new(LoopKind::Loop).wind(12, 90));
        let shared = shared(&sim, at(1, 23, 59) + TimeDelta::seconds(59));

        assert!(matches!(shared.tick(), TickOutcome::Polled { events, .. } if !events.any()));
        sim.set_live(LoopFrameBuilder::new(LoopKind::Loop).wind(4, 180));
        match shared.tick() {
            TickOutcome::Polled { events, .. } => assert!(events.rollover),
            other => panic!("unexpected tick outcome {other:?}"),
        }

        let gate = shared.lock_gate();
        let peak = gate.as_ref().unwrap().gusts.peak().unwrap().clone();
        assert_eq!(peak.speed_mph, 4.0);
        assert_eq!(peak.at, at(2, 0, 0));
    }

    #[test]
    fn live_rain_is_the_rise_in_the_day_total() {
        let sim = SimulatedConsole::new();
        let shared = shared(&sim, at(2, 12, 0));

        for (clicks, et) in [(10, 0.010), (25, 0.012), (40, 0.015), (60, 0.020), (3, 0.001)] {
            sim.set_live(LoopFrameBuilder::new(LoopKind::Loop).day_rain_clicks(clicks).day_et_in(et));
            assert!(matches!(shared.tick(), TickOutcome::Polled { .. }));
        }

        let gate = shared.lock_gate();
        let sink = gate.as_ref().unwrap().sequencer.sink();
        // no baseline on the first frame; the drop to 3 is the midnight reset
        assert_eq!(sink.rain, vec![15, 15, 20, 3]);
        assert_eq!(sink.rain.iter().take(3).sum::<u16>(), 50);
        assert_eq!(sink.et.len(), 4);
        assert!((sink.et[0] - 0.002).abs() < 1e-9);
        assert!((sink.et[3] - 0.001).abs() < 1e-9);
    }

    #[test]
    fn catch_up_clears_the_day_rain_baseline() {
        let sim = SimulatedConsole::new();
        let shared = shared(&sim, at(2, 12, 0));

        sim.set_live(LoopFrameBuilder::new(LoopKind::Loop).day_rain_clicks(10));
        shared.tick();
        assert!(shared.catch_up().is_ok());
        sim.set_live(LoopFrameBuilder::new(LoopKind::Loop).day_rain_clicks(30));
        shared.tick();

        let gate = shared.lock_gate();
        assert!(gate.as_ref().unwrap().sequencer.sink().rain.is_empty());
    }

    #[test]
    fn shutdown_stops_a_worker_stuck_catching_up() {
        let sim = SimulatedConsole::new();
        sim.set_unreachable(true);
        let station = Station::start(session(&sim), sequencer(), options(at(2, 12, 0))).unwrap();
        assert!(wait_for(|| station.status() == StationStatus::Unreachable));

        let signal = station.shutdown_signal().clone();
        let report = station.stop().unwrap();
        assert!(signal.is_triggered());
        assert_eq!(report.catchups, 0);
        assert!(report.sink.records.is_empty());
        assert_eq!(report.handler.rollovers, Vec::<NaiveDateTime>::new());
        assert_eq!(report.sink.temperatures, 0);
    }
}
