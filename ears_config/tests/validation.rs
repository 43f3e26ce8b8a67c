use ears_config::{load_file, load_toml};
use rstest::rstest;
use std::fs;

const BASE: &str = r#"
[left]
encoder = 5
motor_forward = 12
motor_backward = 6

[right]
encoder = 4
motor_forward = 13
motor_backward = 19
"#;

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.timing.watchdog_ms, 4000);
    assert_eq!(cfg.calibration.reference_hole, 0);
    assert_eq!(cfg.sim.pitch, 200);
    assert!(cfg.logging.file.is_none());
}

#[test]
fn rejects_shared_pin_between_ears() {
    let toml = r#"
[left]
encoder = 5
motor_forward = 12
motor_backward = 6

[right]
encoder = 5
motor_forward = 13
motor_backward = 19
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject duplicate pin");
    let msg = format!("{err}");
    assert!(msg.contains("left.encoder") && msg.contains("right.encoder"), "{msg}");
}

#[test]
fn rejects_missing_ear_section() {
    let toml = r#"
[left]
encoder = 5
motor_forward = 12
motor_backward = 6
"#;
    assert!(load_toml(toml).is_err());
}

#[rstest]
#[case("[timing]\nwatchdog_ms = 10", "watchdog_ms must be >= 100")]
#[case("[timing]\nwatchdog_ms = 120000", "unreasonably large")]
#[case("[calibration]\nreference_hole = 17", "reference_hole must be in")]
#[case("[sim]\nhole = 300", "sim.hole must be in")]
#[case("[sim]\ngap = 100", "sim.gap must be larger")]
#[case("[sim]\nunit_us = 0", "sim.unit_us must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
fn rejects_out_of_range_values(#[case] extra: &str, #[case] expected: &str) {
    let toml = format!("{BASE}\n{extra}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(expected), "{err}");
}

#[test]
fn load_file_parses_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ears.toml");
    fs::write(&path, format!("{BASE}\n[calibration]\nreference_hole = 3\n")).unwrap();
    let cfg = load_file(&path).expect("load");
    assert_eq!(cfg.calibration.reference_hole, 3);

    fs::write(&path, format!("{BASE}\n[timing]\nwatchdog_ms = 1\n")).unwrap();
    assert!(load_file(&path).is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/ears.toml");
    let cfg = load_file(&path).expect("sample config");
    assert_eq!(cfg.left.encoder, 24);
    assert_eq!(cfg.right.motor_backward, 13);
    assert_eq!(cfg.logging.rotation.as_deref(), Some("never"));
}
