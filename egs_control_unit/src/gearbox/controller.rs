//! The gearbox controller: one call to [`GearboxController::tick`] per
//! control cycle.
//!
//! ```text
//! cache ──► speeds/selector ──► classifier ──► actual gear
//!                 │                                 │
//!                 ▼                                 ▼
//!          target gear (requests, profile) ──► shift supervisor ──► solenoids
//!                                                                     │
//!          status frames ◄── faults ◄── current feedback ◄────────────┘
//! ```

use super::classifier::GearClassifier;
use super::profile::DriveConditions;
use super::shared::{GearboxHandle, GearboxShared, GearboxStatus};
use super::shift::{ShiftOutcome, ShiftPoll, ShiftSupervisor};
use crate::bus::{GEARBOX_FRAMES, SignalCache};
use crate::error::PersistentCondition;
use crate::solenoid::SolenoidBank;
use egs_common::can::{
    CanFrame, FaultCheckStatus, Gs218, Gs338, Gs418, Gs558, SelectorPosition,
};
use egs_common::consts::{DUTY_PERCENT_MAX, NUM_SOLENOIDS};
use egs_common::control_unit::config::TcuConfig;
use egs_common::control_unit::error::{RuntimeFault, StartupError};
use egs_common::control_unit::gear::Gear;
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{HalError, RawFrame, VoltageSense};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What one cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutput {
    pub status: GearboxStatus,
    /// GS_218 and GS_558, ready to transmit.
    pub frames: [RawFrame; 2],
}

/// Latest decoded inputs.
#[derive(Debug, Clone, Copy, Default)]
struct Inputs {
    input_rpm: u32,
    output_rpm: u32,
    selector: SelectorPosition,
    oil_temp_c: i16,
    kickdown: bool,
}

pub struct GearboxController {
    cache: Arc<SignalCache>,
    bank: Arc<SolenoidBank>,
    classifier: GearClassifier,
    shared: Arc<GearboxShared>,
    supervisor: ShiftSupervisor,

    max_age_ms: u64,
    overspeed_rpm: u32,
    feedback_min_percent: u16,
    open_circuit_ma: f32,

    stale: PersistentCondition,
    feedback: [PersistentCondition; NUM_SOLENOIDS],
    faults: RuntimeFault,

    inputs: Inputs,
    actual: Gear,
}

impl GearboxController {
    /// Build the controller and put MPC at its idle pressure.
    pub fn new(
        config: &TcuConfig,
        cache: Arc<SignalCache>,
        bank: Arc<SolenoidBank>,
        supply: Arc<dyn VoltageSense>,
    ) -> Result<Self, StartupError> {
        if let Some(id) = GEARBOX_FRAMES.iter().find(|&&id| !cache.tracks(id)) {
            return Err(StartupError::Hal(HalError::InitFailed(format!(
                "signal cache does not track frame 0x{id:03X}"
            ))));
        }

        let classifier = GearClassifier::from_config(&config.gearbox)?;
        let min_forward = if config.gearbox.start_in_second {
            Gear::Second
        } else {
            Gear::First
        };

        bank.set_duty_percent_compensated(
            SolenoidId::Mpc,
            config.shift.idle_mpc_percent,
            supply.supply_mv(),
        )?;

        info!(
            "Gearbox controller: {:?} variant, ±{:.0}% ratio windows, start in {}",
            config.gearbox.variant,
            config.gearbox.ratio_tolerance * 100.0,
            min_forward
        );

        let feedback_cycles = config.solenoids.feedback_fault_cycles;
        Ok(Self {
            cache,
            supervisor: ShiftSupervisor::new(Arc::clone(&bank), supply, config.shift.clone()),
            bank,
            classifier,
            shared: Arc::new(GearboxShared::new(min_forward)),
            max_age_ms: config.control.signal_max_age_ms,
            overspeed_rpm: config.gearbox.overspeed_rpm,
            feedback_min_percent: config.solenoids.feedback_min_percent,
            open_circuit_ma: config.solenoids.open_circuit_ma,
            stale: PersistentCondition::new(config.control.stale_fault_cycles),
            feedback: [PersistentCondition::new(feedback_cycles); NUM_SOLENOIDS],
            faults: RuntimeFault::empty(),
            inputs: Inputs::default(),
            actual: Gear::SignalNotAvailable,
        })
    }

    pub fn handle(&self) -> GearboxHandle {
        GearboxHandle::new(Arc::clone(&self.shared))
    }

    pub fn faults(&self) -> RuntimeFault {
        self.faults
    }

    pub fn actual_gear(&self) -> Gear {
        self.actual
    }

    pub fn is_shifting(&self) -> bool {
        self.supervisor.is_active()
    }

    pub fn bank(&self) -> &Arc<SolenoidBank> {
        &self.bank
    }

    fn raise(&mut self, fault: RuntimeFault) {
        if !self.faults.contains(fault) {
            warn!("Fault raised: {:?}", fault);
            self.faults.insert(fault);
        }
    }

    fn clear(&mut self, fault: RuntimeFault) {
        if self.faults.contains(fault) {
            info!("Fault cleared: {:?}", fault);
            self.faults.remove(fault);
        }
    }

    /// Run one control cycle at loop time `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> CycleOutput {
        let settling = self.supervise_shift(now_ms);

        let speeds: Option<Gs338> = self.cache.get(now_ms, self.max_age_ms);
        let state: Option<Gs418> = self.cache.get(now_ms, self.max_age_ms);
        match (speeds, state) {
            (Some(speeds), Some(state)) => {
                self.stale.observe(false);
                self.clear(RuntimeFault::STALE_SIGNAL);
                self.inputs = Inputs {
                    input_rpm: speeds.nturbine() as u32,
                    output_rpm: speeds.nab() as u32,
                    selector: state.whst(),
                    oil_temp_c: state.oil_temp_c(),
                    kickdown: state.kd(),
                };
                self.control(now_ms, settling);
            }
            _ => {
                if self.stale.observe(true) {
                    self.raise(RuntimeFault::STALE_SIGNAL);
                }
                trace!("Signals stale ({} cycles), holding {}", self.stale.active_cycles(), self.actual);
            }
        }

        self.check_feedback();
        self.publish()
    }

    /// Returns `true` if a shift ended this cycle. The speeds read in such a
    /// cycle may predate the gear change, so no new shift is started on them.
    fn supervise_shift(&mut self, now_ms: u64) -> bool {
        match self.supervisor.poll(now_ms) {
            ShiftPoll::Finished { from, to, outcome } => {
                match outcome {
                    ShiftOutcome::Completed => info!("Shift {} -> {} complete", from, to),
                    ShiftOutcome::Cancelled => info!("Shift {} -> {} cancelled", from, to),
                    ShiftOutcome::Failed(reason) => {
                        warn!("Shift {} -> {} failed: {}", from, to, reason)
                    }
                }
                true
            }
            ShiftPoll::TimedOut { .. } => {
                self.raise(RuntimeFault::SHIFT_TIMEOUT);
                true
            }
            ShiftPoll::Idle | ShiftPoll::Running | ShiftPoll::Draining => false,
        }
    }

    /// Everything that needs fresh inputs.
    fn control(&mut self, now_ms: u64, settling: bool) {
        let inputs = self.inputs;
        let target = self.apply_selector(inputs.selector);

        if matches!(inputs.selector, SelectorPosition::P | SelectorPosition::N) {
            self.actual = target;
        }

        if inputs.input_rpm > self.overspeed_rpm {
            self.raise(RuntimeFault::OVERSPEED);
            return;
        }
        self.clear(RuntimeFault::OVERSPEED);

        let reverse = match inputs.selector {
            SelectorPosition::D => false,
            SelectorPosition::R => true,
            _ => return,
        };
        if self.classifier.is_stationary(inputs.output_rpm) {
            return;
        }

        match self
            .classifier
            .classify(inputs.input_rpm, inputs.output_rpm, reverse)
        {
            Some(gear) => {
                if gear != self.actual {
                    debug!("Actual gear {} -> {}", self.actual, gear);
                }
                self.actual = gear;
                self.clear(RuntimeFault::UNCLASSIFIABLE_RATIO);
                if !self.supervisor.is_busy() {
                    self.clear(RuntimeFault::SHIFT_TIMEOUT);
                }
            }
            None if !self.supervisor.is_active() => {
                self.raise(RuntimeFault::UNCLASSIFIABLE_RATIO);
            }
            // Ratio is between gears while the clutches change over.
            None => {}
        }

        if reverse || settling {
            return;
        }
        let target = self.consult_profile(target);
        self.maybe_start_shift(target, now_ms);
    }

    /// Coarse target from the lever. Returns the target after the update.
    fn apply_selector(&self, selector: SelectorPosition) -> Gear {
        let mut request = self.shared.request.lock();
        let next = match selector {
            SelectorPosition::P => Gear::Park,
            SelectorPosition::N => Gear::Neutral,
            SelectorPosition::R if request.target.is_reverse() => request.target,
            SelectorPosition::R => Gear::Reverse1,
            SelectorPosition::D if request.target.is_forward() => request.target,
            SelectorPosition::D => self.shared.min_forward,
            SelectorPosition::Snv => request.target,
        };
        if next != request.target {
            debug!("Selector {:?}: target {} -> {}", selector, request.target, next);
            request.target = next;
        }
        next
    }

    fn consult_profile(&self, target: Gear) -> Gear {
        if self.supervisor.is_busy() || !self.faults.is_empty() || target != self.actual {
            return target;
        }
        let profile = Arc::clone(&self.shared.request.lock().profile);
        let conditions = DriveConditions {
            input_rpm: self.inputs.input_rpm,
            output_rpm: self.inputs.output_rpm,
            actual_gear: self.actual,
            target_gear: target,
            oil_temp_c: self.inputs.oil_temp_c,
            kickdown: self.inputs.kickdown,
        };
        let Some(proposed) = profile.propose_target(&conditions).filter(|g| g.is_forward()) else {
            return target;
        };
        let proposed = self.shared.clamp_forward(proposed);

        let mut request = self.shared.request.lock();
        // A driver request in the meantime wins.
        if request.target == target && proposed != target {
            debug!("Profile {} proposes {}", profile.name(), proposed);
            request.target = proposed;
        }
        request.target
    }

    fn maybe_start_shift(&mut self, target: Gear, now_ms: u64) {
        if !self.faults.is_empty() || self.supervisor.is_busy() {
            return;
        }
        let (Some(actual_n), Some(target_n)) = (self.actual.forward_number(), target.forward_number())
        else {
            return;
        };
        let next = match target_n.cmp(&actual_n) {
            std::cmp::Ordering::Greater => self.actual.next_up(),
            std::cmp::Ordering::Less => self.actual.next_down(),
            std::cmp::Ordering::Equal => None,
        };
        if let Some(next) = next {
            if let Err(e) = self.supervisor.start(self.actual, next, now_ms) {
                warn!("Cannot start shift {} -> {}: {}", self.actual, next, e);
            }
        }
    }

    fn check_feedback(&mut self) {
        let mut open = false;
        for (solenoid, monitor) in self.bank.iter().zip(self.feedback.iter_mut()) {
            let energised = solenoid.commanded_percent() >= self.feedback_min_percent;
            let no_current = solenoid.read_current_estimate() < self.open_circuit_ma;
            if monitor.observe(energised && no_current) {
                if !self.faults.contains(RuntimeFault::SOLENOID_FEEDBACK) {
                    warn!(
                        "{} commanded {}‰ draws {:.0} mA",
                        solenoid.id(),
                        solenoid.commanded_percent(),
                        solenoid.read_current_estimate()
                    );
                }
                open = true;
            }
        }
        if open {
            self.raise(RuntimeFault::SOLENOID_FEEDBACK);
        } else {
            self.clear(RuntimeFault::SOLENOID_FEEDBACK);
        }
    }

    fn publish(&self) -> CycleOutput {
        let status = GearboxStatus {
            target_gear: self.shared.request.lock().target,
            actual_gear: self.actual,
            shifting: self.supervisor.is_active(),
            direction: self.supervisor.direction(),
            faults: self.faults,
            selector: self.inputs.selector,
            input_rpm: self.inputs.input_rpm,
            output_rpm: self.inputs.output_rpm,
        };
        *self.shared.status.lock() = status;

        CycleOutput {
            status,
            frames: [encode_status(&status), self.encode_duties()],
        }
    }

    fn encode_duties(&self) -> RawFrame {
        let scaled = |id: SolenoidId| {
            let percent = self.bank.solenoid(id).commanded_percent() as u32;
            (percent * u8::MAX as u32 / DUTY_PERCENT_MAX as u32) as u8
        };
        let mut frame = Gs558::default();
        frame.set_mpc_duty(scaled(SolenoidId::Mpc));
        frame.set_spc_duty(scaled(SolenoidId::Spc));
        frame.set_tcc_duty(scaled(SolenoidId::Tcc));
        RawFrame {
            id: Gs558::ID,
            payload: frame.raw(),
        }
    }

    /// Stop the shift worker, then the sampler, and release every solenoid.
    pub fn shutdown(&mut self) {
        self.supervisor.shutdown();
        self.bank.shutdown();
    }
}

/// GS_218 for a status snapshot.
pub fn encode_status(status: &GearboxStatus) -> RawFrame {
    let mut frame = Gs218::default();
    frame.set_gzc(status.target_gear.code());
    frame.set_gic(status.actual_gear.code());
    frame.set_schalt(status.shifting);
    frame.set_gs_notl(!status.faults.is_empty());
    frame.set_fehler(status.faults.bits());
    frame.set_fehlprf_st(if status.faults.is_empty() {
        FaultCheckStatus::Ok
    } else {
        FaultCheckStatus::Error
    });
    RawFrame {
        id: Gs218::ID,
        payload: frame.raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solenoid::UncalibratedBank;
    use egs_common::can::{GS_338_ID, GS_418_ID, GearCode};
    use egs_common::hal::driver::HalDriver;
    use egs_hal::drivers::simulation::SimulationDriver;

    struct Rig {
        controller: GearboxController,
        cache: Arc<SignalCache>,
    }

    fn rig(config: TcuConfig) -> Rig {
        let mut driver = SimulationDriver::new();
        driver.init(&config.hal).unwrap();
        let bank = Arc::new(
            UncalibratedBank::new(&mut driver, &config.solenoids)
                .unwrap()
                .calibrate_all()
                .unwrap(),
        );
        let cache = Arc::new(SignalCache::new(&GEARBOX_FRAMES).unwrap());
        let controller = GearboxController::new(
            &config,
            Arc::clone(&cache),
            bank,
            driver.voltage_sense().unwrap(),
        )
        .unwrap();
        Rig { controller, cache }
    }

    fn feed(cache: &SignalCache, now: u64, turbine: u16, output: u16, selector: SelectorPosition) {
        let mut speeds = Gs338::default();
        speeds.set_nturbine(turbine);
        speeds.set_nab(output);
        let mut state = Gs418::default();
        state.set_whst(selector);
        state.set_t_get(130);
        cache.ingest(GS_338_ID, speeds.raw(), now);
        cache.ingest(GS_418_ID, state.raw(), now);
    }

    #[test]
    fn drive_selects_start_gear_and_classifies() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 2000, 1008, SelectorPosition::D);
        let out = rig.controller.tick(20);
        assert_eq!(out.status.target_gear, Gear::Second);
        assert_eq!(out.status.actual_gear, Gear::Second);
        assert!(!out.status.shifting);
        assert!(out.status.faults.is_empty());

        let gs218 = Gs218::from_raw(out.frames[0].payload);
        assert_eq!(out.frames[0].id, Gs218::ID);
        assert_eq!(gs218.gzc(), GearCode::D2);
        assert_eq!(gs218.gic(), GearCode::D2);
        assert!(!gs218.gs_notl());
    }

    #[test]
    fn park_and_neutral_follow_lever() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 800, 0, SelectorPosition::P);
        let out = rig.controller.tick(10);
        assert_eq!(out.status.target_gear, Gear::Park);
        assert_eq!(out.status.actual_gear, Gear::Park);

        feed(&rig.cache, 30, 800, 0, SelectorPosition::N);
        let out = rig.controller.tick(30);
        assert_eq!(out.status.actual_gear, Gear::Neutral);
        assert_eq!(rig.controller.handle().request_gear_up(), None);
    }

    #[test]
    fn reverse_uses_reverse_windows() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 1580, 500, SelectorPosition::R);
        let out = rig.controller.tick(10);
        assert_eq!(out.status.target_gear, Gear::Reverse1);
        assert_eq!(out.status.actual_gear, Gear::Reverse1);
        assert!(out.status.faults.is_empty());
    }

    #[test]
    fn stale_signals_hold_then_latch() {
        let mut config = TcuConfig::default();
        config.control.stale_fault_cycles = 3;
        let mut rig = rig(config);
        feed(&rig.cache, 10, 2000, 1008, SelectorPosition::D);
        rig.controller.tick(10);

        // Nothing new arrives after t=10; max age is 100 ms.
        for (i, now) in [200u64, 220, 240].into_iter().enumerate() {
            let out = rig.controller.tick(now);
            assert_eq!(out.status.actual_gear, Gear::Second);
            assert_eq!(out.status.faults.contains(RuntimeFault::STALE_SIGNAL), i == 2);
        }

        feed(&rig.cache, 250, 2000, 1008, SelectorPosition::D);
        let out = rig.controller.tick(260);
        assert!(out.status.faults.is_empty());
    }

    #[test]
    fn unclassifiable_ratio_latches_and_clears() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 2000, 1008, SelectorPosition::D);
        rig.controller.tick(10);

        feed(&rig.cache, 30, 2800, 1000, SelectorPosition::D);
        let out = rig.controller.tick(30);
        assert!(out.status.faults.contains(RuntimeFault::UNCLASSIFIABLE_RATIO));
        assert_eq!(out.status.actual_gear, Gear::Second);
        let gs218 = Gs218::from_raw(out.frames[0].payload);
        assert!(gs218.gs_notl());
        assert_eq!(gs218.fehler(), RuntimeFault::UNCLASSIFIABLE_RATIO.bits());

        // Requests still move the target, but no shift starts while faulted.
        rig.controller.handle().request_gear_up();
        feed(&rig.cache, 50, 2800, 1000, SelectorPosition::D);
        let out = rig.controller.tick(50);
        assert!(!out.status.shifting);

        feed(&rig.cache, 70, 2000, 1008, SelectorPosition::D);
        let out = rig.controller.tick(70);
        assert!(!out.status.faults.contains(RuntimeFault::UNCLASSIFIABLE_RATIO));
        rig.controller.shutdown();
    }

    #[test]
    fn overspeed_skips_classification() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 12_000, 1000, SelectorPosition::D);
        let out = rig.controller.tick(10);
        assert!(out.status.faults.contains(RuntimeFault::OVERSPEED));
        assert_eq!(out.status.actual_gear, Gear::SignalNotAvailable);

        feed(&rig.cache, 30, 2000, 1008, SelectorPosition::D);
        let out = rig.controller.tick(30);
        assert!(!out.status.faults.contains(RuntimeFault::OVERSPEED));
        assert_eq!(out.status.actual_gear, Gear::Second);
    }

    #[test]
    fn request_starts_single_step_shift() {
        let mut rig = rig(TcuConfig::default());
        feed(&rig.cache, 10, 2000, 1008, SelectorPosition::D);
        rig.controller.tick(10);

        let handle = rig.controller.handle();
        assert_eq!(handle.request_gear_up(), Some(Gear::Third));
        assert_eq!(handle.request_gear_up(), Some(Gear::Fourth));

        feed(&rig.cache, 30, 2000, 1008, SelectorPosition::D);
        let out = rig.controller.tick(30);
        assert!(out.status.shifting);
        assert_eq!(out.status.direction, Some(egs_common::control_unit::gear::ShiftDirection::Up));
        assert!(Gs218::from_raw(out.frames[0].payload).schalt());
        assert_eq!(handle.status(), out.status);
        rig.controller.shutdown();
    }

    #[test]
    fn status_frame_encodes_faults() {
        let status = GearboxStatus {
            target_gear: Gear::Third,
            actual_gear: Gear::Second,
            shifting: true,
            faults: RuntimeFault::SHIFT_TIMEOUT | RuntimeFault::OVERSPEED,
            ..GearboxStatus::default()
        };
        let frame = Gs218::from_raw(encode_status(&status).payload);
        assert_eq!(frame.gzc(), GearCode::D3);
        assert_eq!(frame.gic(), GearCode::D2);
        assert!(frame.schalt());
        assert!(frame.gs_notl());
        assert_eq!(frame.fehler(), 0x0C);
        assert_eq!(frame.fehlprf_st(), FaultCheckStatus::Error);
    }

    #[test]
    fn duty_frame_scales_to_byte() {
        let rig = rig(TcuConfig::default());
        rig.controller.bank().set_duty_percent(SolenoidId::Tcc, 1000).unwrap();
        let frame = Gs558::from_raw(rig.controller.encode_duties().payload);
        assert_eq!(frame.tcc_duty(), 255);
        assert_eq!(frame.spc_duty(), 0);
        assert!(frame.mpc_duty() > 0);
    }
}
