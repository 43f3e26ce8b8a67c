//! The threaded `Ear` handle against a simulated disc turning in real time.
//!
//! One angle unit is 100 µs, so a hole takes 20 ms and a revolution ~0.4 s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ears_core::{Command, EarBuilder, EarConfig, EarError, Position, Reading, Side};
use ears_hardware::sim::{DiscGeometry, SimDisc, SimRunner};
use ears_traits::{Drive, MonotonicClock};
use proptest::prelude::*;

const SETTLE: Duration = Duration::from_secs(10);

fn config() -> EarConfig {
    EarConfig {
        watchdog_timeout: Duration::from_millis(400),
        ..EarConfig::default()
    }
}

fn disc(geometry: DiscGeometry, start: u8) -> SimDisc<MonotonicClock> {
    SimDisc::new(
        geometry,
        start,
        Duration::from_micros(100),
        MonotonicClock::new(),
    )
}

macro_rules! spawn_ear {
    ($disc:expr) => {{
        let ear = EarBuilder::new(Side::Left)
            .with_motor($disc.motor())
            .with_encoder($disc.encoder())
            .with_config(config())
            .spawn()
            .unwrap();
        let sink = ear.edge_sink();
        let runner = SimRunner::spawn($disc.clone(), Duration::from_millis(1), move |at| {
            sink.edge(at)
        });
        (ear, runner)
    }};
}

#[test]
fn calibrates_then_answers_queries_over_bytes() {
    let d = disc(DiscGeometry::default(), 3);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();
    assert_eq!(ear.snapshot().position, Position::new(3));

    assert_eq!(ear.write(b"?").unwrap(), 1);
    assert_eq!(
        ear.read_timeout(SETTLE).unwrap(),
        Some(Reading::Position(Position::new(3)))
    );

    // Opcode and argument may arrive in separate writes.
    assert_eq!(ear.write(b">").unwrap(), 1);
    assert_eq!(ear.write(&[6]).unwrap(), 1);
    // Queries do not wait for the move; wait explicitly.
    ear.wait_settled_timeout(SETTLE).unwrap();
    // One command per write: the second query is left for the caller.
    assert_eq!(ear.write(b"??").unwrap(), 1);
    assert_eq!(
        ear.read_timeout(SETTLE).unwrap(),
        Some(Reading::Position(Position::new(6)))
    );
    assert_eq!(d.hole(), Some(6));
}

#[test]
fn query_or_detect_after_hand_turn() {
    let d = disc(DiscGeometry::default(), 10);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();

    let at = d.turn_by_hand(Drive::Backward).unwrap();
    ear.edge(at);
    assert_eq!(ear.try_read().unwrap(), Some(Reading::Moved));

    ear.submit(Command::QueryOrDetect).unwrap();
    assert_eq!(
        ear.read_timeout(SETTLE).unwrap(),
        Some(Reading::Position(Position::new(9)))
    );
    ear.wait_settled_timeout(SETTLE).unwrap();
    assert_eq!(d.hole(), Some(9));
}

#[test]
fn blocked_reader_wakes_on_hand_turn() {
    let d = disc(DiscGeometry::default(), 0);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();

    std::thread::scope(|s| {
        let reader = s.spawn(|| ear.read());
        std::thread::sleep(Duration::from_millis(20));
        let at = d.turn_by_hand(Drive::Forward).unwrap();
        ear.edge(at);
        assert_eq!(reader.join().unwrap(), Some(Reading::Moved));
    });
}

#[test]
fn broken_ear_rejects_writes_and_reads_hit_eof() {
    let geometry = DiscGeometry {
        pitch: 200,
        gap: 220,
        hole: 70,
    };
    let d = disc(geometry, 0);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();
    assert!(ear.is_broken());
    assert_eq!(d.drive(), Drive::Stop);

    for _ in 0..2 {
        assert_eq!(ear.write(b"?"), Err(EarError::Broken));
        assert_eq!(ear.submit(Command::Nop), Err(EarError::Broken));
        assert_eq!(ear.read(), None);
        assert_eq!(ear.read_timeout(Duration::from_millis(10)), Ok(None));
    }
    let ready = ear.poll();
    assert!(ready.hangup && !ready.writable && !ready.readable);
}

#[test]
fn jam_while_running_is_recovered_by_the_watchdog_thread() {
    let d = disc(DiscGeometry::default(), 5);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();

    d.set_stalled(true);
    ear.submit(Command::Forward(5)).unwrap();
    assert!(!ear.poll().writable);
    ear.wait_settled_timeout(SETTLE).unwrap();
    let snap = ear.snapshot();
    assert_eq!(snap.state, "idle");
    assert_eq!(snap.position, None);
    assert!(!ear.is_broken());
    assert_eq!(d.drive(), Drive::Stop);
}

#[test]
fn writes_wait_for_the_ear_to_settle() {
    let d = disc(DiscGeometry::default(), 2);
    let (ear, _runner) = spawn_ear!(d);
    // Still calibrating: the write blocks until calibration is over.
    ear.submit(Command::Forward(2)).unwrap();
    ear.submit(Command::Query).unwrap();
    ear.wait_settled_timeout(SETTLE).unwrap();
    ear.submit(Command::Query).unwrap();
    assert_eq!(
        ear.read_timeout(SETTLE).unwrap(),
        Some(Reading::Position(Position::new(4)))
    );
}

#[test]
fn nop_write_returns_once_the_ear_is_idle() {
    let d = disc(DiscGeometry::default(), 7);
    let (ear, _runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();

    ear.submit(Command::Forward(17)).unwrap();
    assert_eq!(ear.snapshot().state, "running");
    assert_eq!(ear.write(b".").unwrap(), 1);
    let snap = ear.snapshot();
    assert_eq!(snap.state, "idle");
    assert_eq!(snap.position, Position::new(7));
    assert_eq!(d.hole(), Some(7));
}

#[test]
fn dropping_the_ear_stops_the_motor() {
    let d = disc(DiscGeometry::default(), 2);
    let (ear, runner) = spawn_ear!(d);
    ear.wait_settled_timeout(SETTLE).unwrap();
    ear.submit(Command::Forward(17)).unwrap();
    assert_eq!(d.drive(), Drive::Forward);
    drop(ear);
    assert_eq!(d.drive(), Drive::Stop);
    drop(runner);
}

#[test]
fn missing_parts_fail_the_build() {
    let d = disc(DiscGeometry::default(), 0);
    let err = EarBuilder::<_, ears_hardware::sim::SimEncoder>::new(Side::Right)
        .with_motor(d.motor())
        .spawn()
        .err()
        .unwrap();
    assert!(err.to_string().contains("missing encoder"), "{err}");

    let err = EarBuilder::new(Side::Right)
        .with_motor(d.motor())
        .with_encoder(d.encoder())
        .with_config(EarConfig {
            reference_hole: 17,
            ..EarConfig::default()
        })
        .spawn()
        .err()
        .unwrap();
    assert!(err.to_string().contains("reference_hole"), "{err}");
}

fn moves() -> impl Strategy<Value = Vec<(bool, u8)>> {
    prop::collection::vec((any::<bool>(), 0u8..=20), 1..4)
}

proptest! {
    // Real time: each case calibrates and turns a simulated disc.
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn relative_moves_land_on_the_sum_while_queries_interleave(
        start in 0u8..17,
        moves in moves(),
    ) {
        let d = disc(DiscGeometry::default(), start);
        let (ear, _runner) = spawn_ear!(d);
        ear.wait_settled_timeout(SETTLE).unwrap();
        prop_assert_eq!(ear.snapshot().position, Position::new(start));

        let done = AtomicBool::new(false);
        let expected = std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    ear.submit(Command::Query).unwrap();
                    let _ = ear.try_read().unwrap();
                    std::thread::sleep(Duration::from_millis(3));
                }
            });
            let mut expected = i32::from(start);
            for &(forward, n) in &moves {
                if forward {
                    ear.submit(Command::Forward(n)).unwrap();
                    expected += i32::from(n);
                } else {
                    ear.submit(Command::Backward(n)).unwrap();
                    expected -= i32::from(n);
                }
                ear.wait_settled_timeout(SETTLE).unwrap();
            }
            done.store(true, Ordering::Relaxed);
            expected
        });

        let hole = u8::try_from(expected.rem_euclid(17)).unwrap();
        let snap = ear.snapshot();
        prop_assert_eq!(snap.state, "idle");
        prop_assert_eq!(snap.position, Some(Position::wrapping(expected)));
        prop_assert_eq!(d.hole(), Some(hole));
    }
}
