//! Integration test: driver gear requests against the live loop.

use super::Rig;
use egs_common::can::SelectorPosition;
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::gear::Gear;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn settled() -> Rig {
    let mut rig = Rig::start(&TcuConfig::default()).unwrap();
    rig.cycle_until(10, |out| out.status.actual_gear == Gear::Second)
        .expect("gear classified");
    rig
}

#[test]
fn up_request_from_second_targets_third() {
    let rig = settled();
    assert_eq!(rig.handle().request_gear_up(), Some(Gear::Third));
    assert_eq!(rig.handle().target_gear(), Gear::Third);
}

#[test]
fn target_saturates_at_fifth() {
    let rig = settled();
    let handle = rig.handle();
    for _ in 0..3 {
        handle.request_gear_up();
    }
    assert_eq!(handle.request_gear_up(), Some(Gear::Fifth));
    assert_eq!(handle.request_gear_up(), Some(Gear::Fifth));
    assert_eq!(handle.request_gear_down(), Some(Gear::Fourth));
}

#[test]
fn lever_out_of_drive_rejects_requests() {
    let mut rig = settled();
    rig.plant.set_selector(SelectorPosition::P);
    let out = rig
        .cycle_until(10, |out| out.status.target_gear == Gear::Park)
        .expect("park selected");
    assert_eq!(out.status.actual_gear, Gear::Park);
    assert_eq!(rig.handle().request_gear_up(), None);
    assert_eq!(rig.handle().target_gear(), Gear::Park);

    rig.plant.set_selector(SelectorPosition::D);
    let out = rig
        .cycle_until(10, |out| out.status.actual_gear == Gear::Second)
        .expect("back in drive");
    assert_eq!(out.status.target_gear, Gear::Second);
}

#[test]
fn concurrent_requests_and_status_reads_stay_consistent() {
    let mut rig = settled();
    let stop = Arc::new(AtomicBool::new(false));

    let requesters: Vec<_> = (0..2)
        .map(|i| {
            let handle = rig.handle();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let target = if i == 0 {
                        handle.request_gear_up()
                    } else {
                        handle.request_gear_down()
                    };
                    let n = target.and_then(Gear::forward_number).expect("forward target");
                    assert!((2..=5).contains(&n));
                }
            })
        })
        .collect();

    let observer = {
        let handle = rig.handle();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let status = handle.status();
                assert!(status.target_gear.is_forward());
                assert!(status.actual_gear.is_forward());
                assert_eq!(status.shifting, status.direction.is_some());
            }
        })
    };

    for _ in 0..15 {
        rig.cycle();
    }
    stop.store(true, Ordering::Relaxed);
    for t in requesters {
        t.join().unwrap();
    }
    observer.join().unwrap();
}
