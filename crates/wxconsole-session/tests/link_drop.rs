//! A link that dies under an open handle must be reconnected by whichever
//! operation trips over it, so the next operation starts on a fresh link.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use wxconsole_frame::{LoopFrameBuilder, LoopKind};
use wxconsole_session::{
    download_since, request_loop, ConsoleSession, DownloadOptions, Expect, FaultClass, LoopAbort, SessionConfig,
    SessionError, SimulatedConsole,
};
use wxconsole_transport::TransportError;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

fn session(sim: &SimulatedConsole) -> ConsoleSession<SimulatedConsole> {
    ConsoleSession::new(sim.clone(), SessionConfig::default())
}

fn frame(temp: f64) -> Vec<u8> {
    LoopFrameBuilder::new(LoopKind::Loop)
        .outside_temp_f(temp)
        .build()
        .to_vec()
}

#[test]
fn command_on_a_dead_link_reconnects() {
    let sim = SimulatedConsole::new();
    let mut session = session(&sim);
    session.connect().expect("connect");
    sim.drop_link();

    // asleep: the wake-up trips over the dead link
    let err = session.firmware_version().unwrap_err();
    assert!(matches!(err, SessionError::Transport(TransportError::Closed)));
    assert_eq!(err.fault(), FaultClass::Transport);
    assert_eq!(sim.counters().connects, 2);
    assert_eq!(session.firmware_version().expect("fresh link"), "1.90");

    // awake: the command exchange trips over it
    sim.drop_link();
    let err = session.send_command("TEST", Expect::Ack).unwrap_err();
    assert_eq!(err.fault(), FaultClass::Transport);
    assert_eq!(sim.counters().connects, 3);
    assert!(!session.is_awake());
    session.send_command("TEST", Expect::Ack).expect("fresh link");
}

#[test]
fn loop_batch_on_a_dead_link_reconnects() {
    let sim = SimulatedConsole::new();
    sim.script_loop_frames((0..3).map(|i| frame(60.0 + f64::from(i))));
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 3).expect("LOOP should be acknowledged");
    assert_eq!(batch.next().and_then(|r| r.outside_temp_f), Some(60.0));
    sim.drop_link();
    assert!(batch.next().is_none());
    assert!(matches!(batch.outcome().aborted, Some(LoopAbort::Transport(_))));
    drop(batch);

    let counters = sim.counters();
    assert_eq!(counters.connects, 2);
    assert_eq!(counters.loop_cancels, 0);
}

#[test]
fn dmpaft_negotiation_on_a_dead_link_reconnects() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times((0..5).map(|i| base() + TimeDelta::minutes(5 * i)));
    let mut session = session(&sim);
    session.connect().expect("connect");
    sim.drop_link();

    let err = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .err()
        .expect("download should fail on the dead link");
    assert_eq!(err.fault(), FaultClass::Transport);
    assert_eq!(sim.counters().connects, 2);

    let records = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start on the fresh link")
        .collect::<Result<Vec<_>, _>>()
        .expect("download should succeed");
    assert_eq!(records.len(), 5);
}

#[test]
fn download_on_a_dead_link_ends_and_reconnects() {
    let sim = SimulatedConsole::new();
    sim.push_archive_times((0..15).map(|i| base() + TimeDelta::minutes(5 * i)));
    let mut session = session(&sim);

    let mut download = download_since(&mut session, base() - TimeDelta::minutes(5), DownloadOptions::default())
        .expect("download should start");
    let first_page = download
        .by_ref()
        .take(5)
        .collect::<Result<Vec<_>, _>>()
        .expect("first page should arrive");
    assert_eq!(first_page.len(), 5);

    sim.drop_link();
    let err = download.next().expect("the failure is reported").unwrap_err();
    assert_eq!(err.fault(), FaultClass::Transport);
    assert!(download.next().is_none());
    drop(download);

    let counters = sim.counters();
    assert_eq!(counters.connects, 2);
    // the dump died with the link; nothing to escape on the new one
    assert_eq!(counters.escapes_received, 0);
}
