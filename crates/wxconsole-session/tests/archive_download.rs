use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use wxconsole_frame::{ArchiveFormat, ArchiveRecordBuilder, PageHeader};
use wxconsole_session::{
    download_since, ConsoleSession, DownloadOptions, DownloadProgress, FaultClass, SessionConfig, SessionError,
    SimulatedConsole,
};

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

fn every_five_minutes(count: i64) -> Vec<NaiveDateTime> {
    (0..count).map(|i| base() + TimeDelta::minutes(5 * i)).collect()
}

fn session(sim: &SimulatedConsole) -> ConsoleSession<SimulatedConsole> {
    ConsoleSession::new(sim.clone(), SessionConfig::default())
}

#[test]
fn offset_skips_slots_in_first_page() {
    let sim = SimulatedConsole::new();
    let times = every_five_minutes(15);
    sim.push_archive_times(times.clone());
    let mut session = session(&sim);

    let download = download_since(&mut session, times[1], DownloadOptions::default())
        .expect("download should start");
    assert_eq!(download.header(), PageHeader { pages: 3, offset: 2 });

    let records: Vec<_> = download
        .collect::<Result<Vec<_>, _>>()
        .expect("download should succeed");
    assert_eq!(records.len(), 13);
    let got: Vec<NaiveDateTime> = records.iter().map(|r| r.timestamp).collect();
    assert_eq!(got, times[2..].to_vec());

    let counters = sim.counters();
    assert_eq!(counters.pages_sent, 3);
    assert_eq!(counters.escapes_received, 0);
}

#[test]
fn nothing_newer_is_an_empty_download() {
    let sim = SimulatedConsole::new();
    let times = every_five_minutes(4);
    sim.push_archive_times(times.clone());
    let mut session = session(&sim);

    let download = download_since(&mut session, times[3], DownloadOptions::default())
        .expect("download should start");
    assert_eq!(download.header().pages, 0);
    assert_eq!(download.count(), 0);
}

#[test]
fn page_recovers_within_retry_budget() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(5));
    sim.corrupt_page(0, 3);
    let mut session = session(&sim);

    let records: Vec<_> = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start")
        .collect::<Result<Vec<_>, _>>()
        .expect("fourth pass should validate");
    assert_eq!(records.len(), 5);
    assert_eq!(sim.counters().naks_received, 3);
}

#[test]
fn page_failing_every_pass_aborts_without_its_records() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(10));
    sim.corrupt_page(1, 4);
    let mut session = session(&sim);

    let results: Vec<_> = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start")
        .collect();

    // page 0 delivered, then exactly one error
    assert_eq!(results.len(), 6);
    assert!(results[..5].iter().all(Result::is_ok));
    let err = results[5].as_ref().expect_err("last item should be the abort");
    assert!(matches!(
        err,
        SessionError::PageRetriesExhausted { page: 1, attempts: 4 }
    ));
    assert_eq!(err.fault(), FaultClass::Protocol);

    let counters = sim.counters();
    assert_eq!(counters.naks_received, 3);
    assert_eq!(counters.escapes_received, 1);
}

#[test]
fn stale_and_duplicate_records_are_discarded() {
    let sim = SimulatedConsole::new();
    let t = every_five_minutes(5);
    // logger wrapped: newest slots followed by older leftovers
    sim.push_archive_times([t[2], t[3], t[3], t[4], t[1]]);
    let mut session = session(&sim);

    let got: Vec<NaiveDateTime> = download_since(&mut session, t[0], DownloadOptions::default())
        .expect("download should start")
        .map(|r| r.expect("record").timestamp)
        .collect();
    assert_eq!(got, vec![t[2], t[3], t[4]]);
}

#[test]
fn dropping_download_early_escapes() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(15));
    let mut session = session(&sim);

    {
        let mut download = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
            .expect("download should start");
        assert!(download.next().is_some());
    }
    assert_eq!(sim.counters().escapes_received, 1);

    // the console is idle again and answers the next command
    session.firmware_version().expect("console should answer");
}

#[test]
fn whole_logger_header_is_a_valid_backlog() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(5));
    sim.override_page_header(PageHeader { pages: 512, offset: 0 });
    let mut session = session(&sim);

    let download = download_since(&mut session, base(), DownloadOptions::default())
        .expect("whole-logger replay is not an error");
    assert_eq!(download.header().pages, 512);
}

#[test]
fn bad_offset_is_a_protocol_error() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(5));
    sim.override_page_header(PageHeader { pages: 1, offset: 5 });
    let mut session = session(&sim);

    let err = download_since(&mut session, base(), DownloadOptions::default())
        .err()
        .expect("offset 5 is out of range");
    assert!(matches!(err, SessionError::ProtocolError(_)));
    assert_eq!(sim.counters().escapes_received, 1);
}

#[test]
fn progress_reported_per_page_and_format_forced() {
    let sim = SimulatedConsole::new();
    let slots: Vec<_> = every_five_minutes(7)
        .into_iter()
        .map(|ts| {
            ArchiveRecordBuilder::new(ArchiveFormat::WllIss, ts)
                .humidity(42)
                .build()
        })
        .collect();
    sim.push_archive(slots);
    let mut session = session(&sim);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = DownloadOptions::new()
        .with_format(ArchiveFormat::WllIss)
        .with_interval(15)
        .on_progress(move |p| sink.lock().expect("progress lock").push(p));

    let records: Vec<_> = download_since(&mut session, base() - TimeDelta::minutes(5), options)
        .expect("download should start")
        .collect::<Result<Vec<_>, _>>()
        .expect("download should succeed");
    assert_eq!(records.len(), 7);
    assert!(records.iter().all(|r| r.outside_humidity == Some(42)));
    assert!(records.iter().all(|r| r.interval_minutes == 15));

    let seen = seen.lock().expect("progress lock");
    assert_eq!(
        *seen,
        vec![
            DownloadProgress { page: 1, pages: 2, records: 5 },
            DownloadProgress { page: 2, pages: 2, records: 7 },
        ]
    );
}

#[test]
fn page_retries_pause_between_attempts() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(5));
    sim.corrupt_page(0, 2);
    let config = SessionConfig {
        page_retry_delay: Duration::from_millis(40),
        ..SessionConfig::default()
    };
    let mut session = ConsoleSession::new(sim.clone(), config);

    let started = Instant::now();
    let records: Vec<_> = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start")
        .collect::<Result<Vec<_>, _>>()
        .expect("page should recover");
    assert_eq!(records.len(), 5);
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(sim.counters().naks_received, 2);
}

#[test]
fn shutdown_interrupts_page_retry_pause() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times(every_five_minutes(5));
    sim.corrupt_page(0, 4);
    let config = SessionConfig {
        page_retry_delay: Duration::from_secs(10),
        ..SessionConfig::default()
    };
    let shutdown = config.shutdown.clone();
    let mut session = ConsoleSession::new(sim.clone(), config);

    let download = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start");
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        shutdown.trigger();
    });
    let started = Instant::now();
    let items: Vec<_> = download.collect();
    trigger.join().expect("trigger thread");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(SessionError::Shutdown)));
    assert_eq!(sim.counters().naks_received, 0);
}
