use wxconsole_frame::{LoopFrameBuilder, LoopKind};
use wxconsole_session::{request_loop, ConsoleSession, LoopAbort, SessionConfig, SimulatedConsole};

fn frame(temp: f64) -> Vec<u8> {
    LoopFrameBuilder::new(LoopKind::Loop)
        .outside_temp_f(temp)
        .build()
        .to_vec()
}

fn session(sim: &SimulatedConsole) -> ConsoleSession<SimulatedConsole> {
    ConsoleSession::new(sim.clone(), SessionConfig::default())
}

fn temps(records: &[wxconsole_frame::LoopRecord]) -> Vec<f64> {
    records.iter().filter_map(|r| r.outside_temp_f).collect()
}

#[test]
fn delivers_requested_frames() {
    let sim = SimulatedConsole::new();
    sim.script_loop_frames((0..3).map(|i| frame(60.0 + f64::from(i))));
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 3).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(temps(&records), vec![60.0, 61.0, 62.0]);
    assert_eq!(batch.outcome().delivered, 3);
    assert_eq!(batch.outcome().aborted, None);
    drop(batch);

    assert_eq!(sim.counters().commands, vec!["LOOP 3".to_string()]);
    assert_eq!(sim.counters().loop_cancels, 0);
}

#[test]
fn bad_header_drops_only_that_frame() {
    let sim = SimulatedConsole::new();
    let mut corrupted = frame(61.0);
    corrupted[1] = b'X';
    sim.script_loop_frames([frame(60.0), corrupted, frame(62.0), frame(63.0)]);
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 4).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(temps(&records), vec![60.0, 62.0, 63.0]);
    assert_eq!(batch.outcome().resyncs, 1);
    assert_eq!(batch.outcome().aborted, None);
}

#[test]
fn misaligned_stream_resyncs_after_flush() {
    let sim = SimulatedConsole::new();
    // a stray byte shifts frame 1; the flush drops its tail
    let mut shifted = vec![0x42];
    shifted.extend(frame(61.0));
    sim.script_loop_frames([frame(60.0), shifted, frame(62.0)]);
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 3).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(temps(&records), vec![60.0, 62.0]);
}

#[test]
fn two_consecutive_mismatches_abort() {
    let sim = SimulatedConsole::new();
    let mut bad = frame(61.0);
    bad[0] = b'Z';
    sim.script_loop_frames([frame(60.0), bad.clone(), bad, frame(63.0)]);
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 4).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(temps(&records), vec![60.0]);
    assert_eq!(batch.outcome().aborted, Some(LoopAbort::Resync));
    drop(batch);
    assert_eq!(sim.counters().loop_cancels, 1);
}

#[test]
fn bad_crc_drops_one_record() {
    let sim = SimulatedConsole::new();
    let mut bad = frame(61.0);
    bad[20] ^= 0x01;
    sim.script_loop_frames([frame(60.0), bad, frame(62.0)]);
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 3).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(temps(&records), vec![60.0, 62.0]);
    assert_eq!(batch.outcome().dropped, 1);
    assert_eq!(batch.outcome().resyncs, 0);
}

#[test]
fn silence_trips_the_watchdog() {
    let sim = SimulatedConsole::new();
    sim.script_loop_frames([frame(60.0), frame(61.0)]);
    let mut session = session(&sim);

    let mut batch = request_loop(&mut session, LoopKind::Loop, 5).expect("LOOP should be acknowledged");
    let records: Vec<_> = batch.by_ref().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(batch.outcome().aborted, Some(LoopAbort::Watchdog));
}

#[test]
fn dropping_batch_early_cancels_stream() {
    let sim = SimulatedConsole::new();
    let mut session = session(&sim);
    {
        let mut batch = request_loop(&mut session, LoopKind::Loop2, 10).expect("LPS should be acknowledged");
        let first = batch.next().expect("first frame");
        assert_eq!(first.kind, LoopKind::Loop2);
    }
    assert_eq!(sim.counters().loop_cancels, 1);

    // next command goes straight through
    let mut batch = request_loop(&mut session, LoopKind::Loop, 1).expect("LOOP should be acknowledged");
    assert!(batch.next().is_some());
}

#[test]
fn unacknowledged_loop_is_retried_once() {
    let sim = SimulatedConsole::new();
    sim.drop_replies(1);
    let mut session = session(&sim);
    let mut batch = request_loop(&mut session, LoopKind::Loop, 1).expect("retry should succeed");
    assert!(batch.next().is_some());
    drop(batch);
    assert_eq!(sim.counters().commands, vec!["LOOP 1".to_string(), "LOOP 1".to_string()]);
}
