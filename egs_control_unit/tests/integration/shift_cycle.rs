//! Integration test: shift procedure, its supervision and fault latching.

use super::{Rig, config};
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::error::RuntimeFault;
use egs_common::control_unit::gear::{Gear, ShiftDirection};
use egs_common::control_unit::solenoid::SolenoidId;
use egs_control_unit::gearbox::RpmLimitProfile;
use std::sync::Arc;

fn settled(config: &TcuConfig) -> Rig {
    let mut rig = Rig::start(config).unwrap();
    rig.cycle_until(10, |out| out.status.actual_gear == Gear::Second)
        .expect("gear classified");
    rig
}

#[test]
fn up_request_shifts_second_to_third() {
    let mut rig = settled(&TcuConfig::default());
    rig.handle().request_gear_up();

    let started = rig
        .cycle_until(5, |out| out.status.shifting)
        .expect("shift started");
    assert_eq!(started.status.direction, Some(ShiftDirection::Up));
    assert_eq!(rig.bank().solenoid(SolenoidId::Y5).commanded_percent(), 1000);

    let done = rig
        .cycle_until(100, |out| {
            !out.status.shifting && out.status.actual_gear == Gear::Third
        })
        .expect("third engaged");
    assert!(done.status.faults.is_empty());
    assert_eq!(done.status.target_gear, Gear::Third);
    assert_eq!(rig.plant.engaged_gear(), Gear::Third);
    assert_eq!(rig.bank().solenoid(SolenoidId::Y5).commanded_percent(), 0);
    assert_eq!(rig.plant.duty(SolenoidId::Y5), 0.0);
}

#[test]
fn down_request_from_third_returns_to_second() {
    let mut rig = settled(&TcuConfig::default());
    rig.handle().request_gear_up();
    rig.cycle_until(100, |out| {
        !out.status.shifting && out.status.actual_gear == Gear::Third
    })
    .expect("third engaged");

    rig.handle().request_gear_down();
    let started = rig
        .cycle_until(5, |out| out.status.shifting)
        .expect("shift started");
    assert_eq!(started.status.direction, Some(ShiftDirection::Down));
    rig.cycle_until(100, |out| {
        !out.status.shifting && out.status.actual_gear == Gear::Second
    })
    .expect("second engaged");
    assert_eq!(rig.plant.engaged_gear(), Gear::Second);
}

#[test]
fn rpm_limit_profile_upshifts_at_redline() {
    let mut rig = settled(&TcuConfig::default());
    rig.handle().set_profile(Arc::new(RpmLimitProfile::default()));
    assert_eq!(rig.handle().profile_name(), "rpm-limit");

    rig.plant.set_turbine_rpm(4200);
    let out = rig
        .cycle_until(100, |out| out.status.actual_gear == Gear::Third)
        .expect("profile shifted up");
    assert!(out.status.faults.is_empty());
}

#[test]
fn missed_deadline_latches_shift_timeout_then_recovers() {
    let cfg = config(
        r#"
[shift]
timeout_ms = 100
solenoid_hold_ms = 600

[hal.driver_config.simulation]
shift_engage_ms = 60000
"#,
    );
    let mut rig = settled(&cfg);
    rig.handle().request_gear_up();

    let out = rig
        .cycle_until(30, |out| out.status.faults.contains(RuntimeFault::SHIFT_TIMEOUT))
        .expect("timeout latched");
    assert!(!out.status.shifting);
    assert_eq!(out.status.actual_gear, Gear::Second);
    // The cancelled worker released the shift solenoid within the cycle gap.
    assert_eq!(rig.bank().solenoid(SolenoidId::Y5).commanded_percent(), 0);

    rig.cycle_until(10, |out| out.status.faults.is_empty())
        .expect("timeout cleared once the worker drained");
}

#[test]
fn open_shift_solenoid_latches_feedback_fault() {
    let cfg = config(
        r#"
[solenoids]
feedback_fault_cycles = 5

[hal.driver_config.simulation]
open_channels = ["y5"]
"#,
    );
    let mut rig = settled(&cfg);
    rig.handle().request_gear_up();

    let out = rig
        .cycle_until(20, |out| {
            out.status.faults.contains(RuntimeFault::SOLENOID_FEEDBACK)
        })
        .expect("feedback fault latched");
    assert!(out.status.shifting);

    let y5 = rig
        .bank()
        .diagnostics()
        .into_iter()
        .find(|d| d.id == SolenoidId::Y5)
        .expect("y5 diagnostics");
    assert_eq!(y5.commanded_percent, 1000);
    assert_eq!(y5.current_ma, 0.0);
}

#[test]
fn silent_bus_latches_stale_and_holds_gear() {
    let mut rig = settled(&TcuConfig::default());
    rig.plant.set_bus_silent(true);

    let out = rig
        .cycle_until(30, |out| out.status.faults.contains(RuntimeFault::STALE_SIGNAL))
        .expect("stale latched");
    assert_eq!(out.status.actual_gear, Gear::Second);

    // Requests are accepted but no shift starts while faulted.
    rig.handle().request_gear_up();
    for _ in 0..5 {
        assert!(!rig.cycle().status.shifting);
    }

    rig.plant.set_bus_silent(false);
    rig.cycle_until(5, |out| !out.status.faults.contains(RuntimeFault::STALE_SIGNAL))
        .expect("stale cleared");
}
