//! Integration test: startup sequence.
//!
//! Config → HAL driver → calibration → first control cycles.

use super::{Rig, config};
use egs_common::can::{CanFrame, GS_218_ID, GearCode, Gs218};
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::error::{CalibrationFault, StartupError};
use egs_common::control_unit::gear::Gear;
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::HalError;
use egs_control_unit::config::load_config_from_str;
use egs_hal::DriverRegistry;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

#[test]
fn calibration_references_match_idle_readings() {
    let rig = Rig::start(&TcuConfig::default()).unwrap();
    for (i, diag) in rig.bank().diagnostics().iter().enumerate() {
        // Simulated idle reading is 120 counts plus 3 per channel.
        assert_eq!(diag.vref, 120 + 3 * i as u16, "{}", diag.id);
    }
    assert_eq!(rig.bank().solenoid(SolenoidId::Y3).commanded_percent(), 0);
}

#[test]
fn shorted_solenoid_aborts_startup() {
    let cfg = config(
        r#"
[hal.driver_config.simulation]
shorted_channels = ["tcc"]
"#,
    );
    match Rig::start(&cfg) {
        Err(StartupError::Calibration(CalibrationFault::Shorted { channel, vref, .. })) => {
            assert_eq!(channel, SolenoidId::Tcc);
            assert_eq!(vref, 900);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("startup should fail"),
    }
}

#[test]
fn unknown_driver_not_found() {
    let registry = DriverRegistry::with_builtin_drivers();
    assert!(matches!(
        registry.create_driver("tc1791"),
        Err(HalError::DriverNotFound(_))
    ));
}

#[test]
fn invalid_config_rejected_before_hardware() {
    let result = load_config_from_str(
        r#"
[shift]
timeout_ms = 300
solenoid_hold_ms = 400
"#,
    );
    assert!(result.is_err());
}

#[test]
fn first_cycles_settle_in_second() {
    let mut rig = Rig::start(&TcuConfig::default()).unwrap();
    let out = rig
        .cycle_until(10, |out| out.status.actual_gear == Gear::Second)
        .expect("gear classified");
    assert_eq!(out.status.target_gear, Gear::Second);
    assert!(out.status.faults.is_empty());

    let payload = rig.plant.last_transmitted(GS_218_ID).expect("status sent");
    let frame = Gs218::from_raw(payload);
    assert_eq!(frame.gic(), GearCode::D2);
    assert_eq!(frame.gzc(), GearCode::D2);
    assert!(!frame.gs_notl());
}

#[test]
fn run_stops_on_flag_and_releases_solenoids() {
    let mut rig = Rig::start(&TcuConfig::default()).unwrap();
    let running = rig.runner.running_flag();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        running.store(false, Ordering::SeqCst);
    });

    rig.runner.run().unwrap();
    stopper.join().unwrap();

    assert!(rig.runner.stats().cycle_count > 0);
    assert!(!rig.bank().sampler_running());
    for id in SolenoidId::ALL {
        assert_eq!(rig.plant.duty(id), 0.0, "{id}");
    }
}
