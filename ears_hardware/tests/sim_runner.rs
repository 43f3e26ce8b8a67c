//! Real-time simulated disc driven by the background runner.

use ears_hardware::{DiscGeometry, SimDisc, SimRunner};
use ears_traits::{Drive, MonotonicClock, MotorDriver};
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn fast_disc(start: u8) -> SimDisc<MonotonicClock> {
    SimDisc::new(
        DiscGeometry::default(),
        start,
        Duration::from_micros(10),
        MonotonicClock::new(),
    )
}

#[rstest]
#[case(Drive::Forward)]
#[case(Drive::Backward)]
fn runner_delivers_edges_while_driven(#[case] drive: Drive) {
    let disc = fast_disc(0);
    let seen = Arc::new(AtomicU64::new(0));
    let seen_cb = seen.clone();
    let runner = SimRunner::spawn(disc.clone(), Duration::from_millis(1), move |_at| {
        seen_cb.fetch_add(1, Ordering::Relaxed);
    });

    disc.motor().drive(drive).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    disc.motor().drive(Drive::Stop).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let after_stop = seen.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(30));

    assert!(after_stop > 0, "no edges delivered");
    assert_eq!(seen.load(Ordering::Relaxed), after_stop, "edges after stop");
    drop(runner);
}

#[test]
fn runner_exits_on_drop() {
    let disc = fast_disc(3);
    let runner = SimRunner::spawn(disc, Duration::from_millis(1), |_| {});
    std::thread::sleep(Duration::from_millis(10));
    drop(runner);
}
