//! Simulated valve body and drivetrain.
//!
//! One `PlantState` behind a mutex is shared by every simulated peripheral.
//! PWM writes land here, ADC reads and bus frames are derived from it.

use egs_common::can::{CanFrame, GearCode, Gs338, Gs418, MechVariant, SelectorPosition};
use egs_common::consts::{ADC_TO_MA, NOMINAL_SOLENOID_VOLTAGE_MV, NUM_SOLENOIDS};
use egs_common::control_unit::gear::{Gear, TransmissionVariant};
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{HalError, RawFrame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ─── Configuration ──────────────────────────────────────────────────

/// `[hal.driver_config.simulation]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Solenoid supply voltage [mV].
    pub supply_mv: u16,
    /// Current-sense reading of an unpowered channel [raw counts].
    pub idle_adc: u16,
    /// Idle reading of a shorted channel [raw counts].
    pub shorted_adc: u16,
    /// Coil current at 100% duty and nominal supply [mA].
    pub coil_current_ma: f32,
    /// Channels that read as shorted at idle.
    pub shorted_channels: Vec<SolenoidId>,
    /// Channels that draw no current whatever the duty.
    pub open_channels: Vec<SolenoidId>,
    /// Ratio set of the simulated gearbox.
    pub variant: TransmissionVariant,
    /// Forward gear engaged at power-up, 1..=5.
    pub initial_gear: u8,
    /// Turbine speed [rpm].
    pub turbine_rpm: u16,
    /// Energised time a shift solenoid needs before its release moves the
    /// gear [ms].
    pub shift_engage_ms: u64,
    /// Interval between speed/state frames [ms].
    pub frame_period_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            supply_mv: 13_800,
            idle_adc: 120,
            shorted_adc: 900,
            coil_current_ma: 1000.0,
            shorted_channels: Vec::new(),
            open_channels: Vec::new(),
            variant: TransmissionVariant::Large,
            initial_gear: 2,
            turbine_rpm: 2000,
            shift_engage_ms: 100,
            frame_period_ms: 10,
        }
    }
}

impl SimulationConfig {
    /// Parse from the driver's opaque TOML table; defaults when absent.
    pub fn from_section(section: Option<&toml::Value>) -> Result<Self, HalError> {
        let cfg: Self = match section {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| HalError::ConfigError(e.to_string()))?,
            None => Self::default(),
        };
        if Gear::from_forward_number(cfg.initial_gear).is_none() {
            return Err(HalError::ConfigError(format!(
                "initial_gear {} out of range [1, 5]",
                cfg.initial_gear
            )));
        }
        Ok(cfg)
    }
}

// ─── Plant State ────────────────────────────────────────────────────

#[derive(Debug)]
struct PlantState {
    config: SimulationConfig,
    /// Duty fraction 0.0..=1.0 per channel.
    duty: [f32; NUM_SOLENOIDS],
    energised_since: [Option<Instant>; NUM_SOLENOIDS],
    supply_mv: u16,
    selector: SelectorPosition,
    /// Last forward gear, kept while the lever is out of D.
    forward_gear: Gear,
    turbine_rpm: u16,
    speed_override: Option<(u16, u16)>,
    bus_silent: bool,
    last_emit: Option<Instant>,
    transmitted: HashMap<u32, u64>,
    tx_count: u64,
}

impl PlantState {
    fn new(config: SimulationConfig) -> Self {
        let forward_gear = Gear::from_forward_number(config.initial_gear).unwrap_or(Gear::Second);
        Self {
            duty: [0.0; NUM_SOLENOIDS],
            energised_since: [None; NUM_SOLENOIDS],
            supply_mv: config.supply_mv,
            selector: SelectorPosition::D,
            forward_gear,
            turbine_rpm: config.turbine_rpm,
            speed_override: None,
            bus_silent: false,
            last_emit: None,
            transmitted: HashMap::new(),
            tx_count: 0,
            config,
        }
    }

    fn engaged(&self) -> Gear {
        match self.selector {
            SelectorPosition::P => Gear::Park,
            SelectorPosition::R => Gear::Reverse1,
            SelectorPosition::N => Gear::Neutral,
            SelectorPosition::D => self.forward_gear,
            SelectorPosition::Snv => Gear::SignalNotAvailable,
        }
    }

    fn nominal_ratio(&self, gear: Gear) -> Option<f64> {
        let variant = self.config.variant;
        if let Some(n) = gear.forward_number() {
            return Some(variant.forward_ratios()[n as usize - 1]);
        }
        match gear {
            Gear::Reverse1 => Some(variant.reverse_ratios()[0]),
            Gear::Reverse2 => Some(variant.reverse_ratios()[1]),
            _ => None,
        }
    }

    /// (turbine, output) speeds in rpm.
    fn speeds(&self) -> (u16, u16) {
        if let Some(speeds) = self.speed_override {
            return speeds;
        }
        let output = self
            .nominal_ratio(self.engaged())
            .map(|ratio| (self.turbine_rpm as f64 / ratio).round() as u16)
            .unwrap_or(0);
        (self.turbine_rpm, output)
    }

    /// Gear reached when `id` is released in `from`.
    fn shift_target(id: SolenoidId, from: Gear) -> Option<Gear> {
        match (id, from) {
            (SolenoidId::Y3, Gear::First) => Some(Gear::Second),
            (SolenoidId::Y3, Gear::Second) => Some(Gear::First),
            (SolenoidId::Y3, Gear::Fourth) => Some(Gear::Fifth),
            (SolenoidId::Y3, Gear::Fifth) => Some(Gear::Fourth),
            (SolenoidId::Y5, Gear::Second) => Some(Gear::Third),
            (SolenoidId::Y5, Gear::Third) => Some(Gear::Second),
            (SolenoidId::Y4, Gear::Third) => Some(Gear::Fourth),
            (SolenoidId::Y4, Gear::Fourth) => Some(Gear::Third),
            _ => None,
        }
    }

    fn apply_duty(&mut self, id: SolenoidId, fraction: f32) {
        let idx = id.index();
        let was_on = self.duty[idx] > 0.0;
        self.duty[idx] = fraction;
        if !id.is_shift_solenoid() {
            return;
        }
        match (was_on, fraction > 0.0) {
            (false, true) => self.energised_since[idx] = Some(Instant::now()),
            (true, false) => {
                let held = self.energised_since[idx].take().map(|t| t.elapsed());
                let engage = Duration::from_millis(self.config.shift_engage_ms);
                if held.is_some_and(|h| h >= engage) && self.selector == SelectorPosition::D {
                    if let Some(next) = Self::shift_target(id, self.forward_gear) {
                        info!("Simulated gearbox {} -> {} via {}", self.forward_gear, next, id);
                        self.forward_gear = next;
                    }
                }
            }
            _ => {}
        }
    }

    fn adc_reading(&self, id: SolenoidId) -> u16 {
        let idx = id.index();
        let idle = if self.config.shorted_channels.contains(&id) {
            self.config.shorted_adc
        } else {
            self.config.idle_adc + idx as u16 * 3
        };
        if self.config.open_channels.contains(&id) {
            return idle;
        }
        let supply_scale = self.supply_mv as f32 / NOMINAL_SOLENOID_VOLTAGE_MV as f32;
        let ma = self.duty[idx] * self.config.coil_current_ma * supply_scale;
        let counts = (ma / ADC_TO_MA).round();
        idle.saturating_add(counts.min(u16::MAX as f32) as u16)
    }

    fn state_frames(&self) -> [RawFrame; 2] {
        let (turbine, output) = self.speeds();
        let mut speeds = Gs338::default();
        speeds.set_nturbine(turbine);
        speeds.set_nab(output);

        let mut state = Gs418::default();
        state.set_whst(self.selector);
        state.set_mech(match self.config.variant {
            TransmissionVariant::Small => MechVariant::Small,
            TransmissionVariant::Large => MechVariant::Large,
        });
        state.set_t_get(130);
        state.set_gic(GearCode::from(self.engaged()));
        [
            RawFrame {
                id: Gs338::ID,
                payload: speeds.raw(),
            },
            RawFrame {
                id: Gs418::ID,
                payload: state.raw(),
            },
        ]
    }
}

// ─── Plant Handle ───────────────────────────────────────────────────

/// Shared handle to the simulated plant.
///
/// Cloned into every simulated peripheral. Tests keep one to move the lever,
/// change speeds or inspect what the controller transmitted.
#[derive(Clone)]
pub struct SimPlant {
    state: Arc<Mutex<PlantState>>,
}

impl SimPlant {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState::new(config))),
        }
    }

    /// Reset the plant to a new configuration. Existing handles follow.
    pub fn reconfigure(&self, config: SimulationConfig) {
        debug!("Simulated plant reconfigured: {:?}", config);
        *self.state.lock() = PlantState::new(config);
    }

    pub fn set_selector(&self, selector: SelectorPosition) {
        self.state.lock().selector = selector;
    }

    pub fn set_turbine_rpm(&self, rpm: u16) {
        self.state.lock().turbine_rpm = rpm;
    }

    /// Force (turbine, output) speeds regardless of the engaged gear.
    pub fn override_speeds(&self, speeds: Option<(u16, u16)>) {
        self.state.lock().speed_override = speeds;
    }

    pub fn set_supply_mv(&self, mv: u16) {
        self.state.lock().supply_mv = mv;
    }

    /// Stop emitting frames, as if the bus went quiet.
    pub fn set_bus_silent(&self, silent: bool) {
        self.state.lock().bus_silent = silent;
    }

    /// Gear the simulated gearbox is in.
    pub fn engaged_gear(&self) -> Gear {
        self.state.lock().engaged()
    }

    /// Duty fraction currently applied to `id`.
    pub fn duty(&self, id: SolenoidId) -> f32 {
        self.state.lock().duty[id.index()]
    }

    /// Last payload transmitted under `id`.
    pub fn last_transmitted(&self, id: u32) -> Option<u64> {
        self.state.lock().transmitted.get(&id).copied()
    }

    pub fn transmit_count(&self) -> u64 {
        self.state.lock().tx_count
    }

    pub(crate) fn apply_duty(&self, id: SolenoidId, fraction: f32) {
        self.state.lock().apply_duty(id, fraction);
    }

    pub(crate) fn adc_reading(&self, id: SolenoidId) -> u16 {
        self.state.lock().adc_reading(id)
    }

    pub(crate) fn supply_mv(&self) -> u16 {
        self.state.lock().supply_mv
    }

    /// Frames due for emission, if the frame period has elapsed.
    pub(crate) fn poll_frames(&self) -> Option<[RawFrame; 2]> {
        let mut state = self.state.lock();
        if state.bus_silent {
            return None;
        }
        let period = Duration::from_millis(state.config.frame_period_ms);
        let now = Instant::now();
        if state.last_emit.is_some_and(|t| now.duration_since(t) < period) {
            return None;
        }
        state.last_emit = Some(now);
        Some(state.state_frames())
    }

    pub(crate) fn record_transmit(&self, frame: RawFrame) {
        let mut state = self.state.lock();
        state.transmitted.insert(frame.id, frame.payload);
        state.tx_count += 1;
    }
}

impl Default for SimPlant {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
