//! Start-up calibration against the simulated disc.

use std::time::Duration;

use ears_core::{ActuatorState, EarConfig, EarMachine, FaultKind, Position};
use ears_hardware::sim::{DiscGeometry, SimDisc, SimEncoder, SimMotor};
use ears_traits::ManualClock;
use rstest::rstest;

type SimMachine = EarMachine<SimMotor, SimEncoder, ManualClock>;

fn setup(geometry: DiscGeometry, start_hole: u8, config: EarConfig) -> (SimMachine, SimDisc<ManualClock>) {
    let clock = ManualClock::new();
    let disc = SimDisc::new(geometry, start_hole, Duration::from_millis(1), clock.clone());
    let machine = EarMachine::new(disc.motor(), disc.encoder(), clock, config);
    (machine, disc)
}

/// Feed edges (or watchdog expiries) until the machine settles.
fn pump(m: &mut SimMachine, disc: &SimDisc<ManualClock>) {
    for _ in 0..1000 {
        if m.is_settled() {
            return;
        }
        match disc.next_edge() {
            Some(at) => {
                let _ = m.on_edge(at);
            }
            None => {
                disc.clock()
                    .advance(m.watchdog_remaining().unwrap_or_default());
                let _ = m.check_watchdog();
            }
        }
    }
    panic!("machine never settled: {:?}", m.state());
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(7)]
#[case(15)]
#[case(16)]
fn calibration_finds_the_resting_hole(#[case] start: u8) {
    let (mut m, disc) = setup(DiscGeometry::default(), start, EarConfig::default());
    let _ = m.begin();
    pump(&mut m, &disc);

    assert_eq!(
        m.state(),
        ActuatorState::Idle {
            position: Position::new(start)
        }
    );
    assert_eq!(disc.hole(), Some(start));
    // Sync edge, one revolution, one step back.
    assert_eq!(disc.edges(), 19);
    let boundary = m.boundary().unwrap().get();
    assert_eq!(boundary, Duration::from_millis(475));
}

#[test]
fn reference_hole_shifts_reported_positions() {
    let cfg = EarConfig {
        reference_hole: 3,
        ..EarConfig::default()
    };
    let (mut m, disc) = setup(DiscGeometry::default(), 5, cfg);
    let _ = m.begin();
    pump(&mut m, &disc);
    assert_eq!(m.position(), Position::new(2));

    let (mut m, disc) = setup(DiscGeometry::default(), 1, cfg);
    let _ = m.begin();
    pump(&mut m, &disc);
    assert_eq!(m.position(), Position::new(15));
}

#[test]
fn indistinct_gap_breaks_the_ear() {
    let geometry = DiscGeometry {
        pitch: 200,
        gap: 250,
        hole: 70,
    };
    let (mut m, disc) = setup(geometry, 4, EarConfig::default());
    let _ = m.begin();
    pump(&mut m, &disc);
    assert!(m.is_broken());
    assert_eq!(m.fault(), Some(FaultKind::CalibrationAmbiguous));
    assert_eq!(disc.drive(), ears_traits::Drive::Stop);
}

#[test]
fn jammed_disc_breaks_the_ear_after_the_watchdog() {
    let (mut m, disc) = setup(DiscGeometry::default(), 4, EarConfig::default());
    disc.set_stalled(true);
    let _ = m.begin();
    let started = disc.clock().elapsed();
    pump(&mut m, &disc);
    assert_eq!(m.fault(), Some(FaultKind::WatchdogTimeout));
    assert_eq!(disc.clock().elapsed() - started, Duration::from_millis(4000));
}

#[test]
fn slow_but_distinct_disc_still_calibrates() {
    let geometry = DiscGeometry {
        pitch: 900,
        gap: 2400,
        hole: 100,
    };
    let (mut m, disc) = setup(geometry, 9, EarConfig::default());
    let _ = m.begin();
    pump(&mut m, &disc);
    assert_eq!(m.position(), Position::new(9));
    assert!(m.boundary().unwrap().get() > m.config().slow_boundary);
}

#[test]
fn encoder_fault_during_calibration_is_a_hardware_fault() {
    let (mut m, disc) = setup(DiscGeometry::default(), 0, EarConfig::default());
    let _ = m.begin();
    disc.set_encoder_faulty(true);
    // Calibration never reads the level; the fault surfaces on the first
    // command that does.
    pump(&mut m, &disc);
    assert_eq!(m.position(), Position::new(0));
    assert!(m.execute(ears_core::Command::Nop).is_err());
    assert_eq!(m.fault(), Some(FaultKind::Hardware));
}
