//! Simulated peripherals handed out by the simulation driver.

use super::plant::SimPlant;
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::consts::NUM_SOLENOIDS;
use egs_common::hal::driver::{AdcMux, CanBus, HalError, PwmOutput, RawFrame, VoltageSense};
use std::collections::VecDeque;
use tracing::trace;

// ─── PWM ────────────────────────────────────────────────────────────

/// PWM output of one simulated solenoid.
pub struct SimPwm {
    id: SolenoidId,
    plant: SimPlant,
    freq_hz: u32,
    resolution_bits: u8,
    duty: u32,
}

impl SimPwm {
    pub(crate) fn new(id: SolenoidId, plant: SimPlant) -> Self {
        Self {
            id,
            plant,
            freq_hz: 0,
            resolution_bits: 0,
            duty: 0,
        }
    }

    pub fn freq_hz(&self) -> u32 {
        self.freq_hz
    }
}

impl PwmOutput for SimPwm {
    fn configure(&mut self, freq_hz: u32, resolution_bits: u8) -> Result<(), HalError> {
        if freq_hz == 0 || resolution_bits == 0 || resolution_bits > 16 {
            return Err(HalError::ConfigError(format!(
                "{}: unsupported PWM {freq_hz} Hz / {resolution_bits} bit",
                self.id
            )));
        }
        self.freq_hz = freq_hz;
        self.resolution_bits = resolution_bits;
        self.duty = 0;
        self.plant.apply_duty(self.id, 0.0);
        Ok(())
    }

    fn max_duty(&self) -> u32 {
        if self.resolution_bits == 0 {
            0
        } else {
            (1u32 << self.resolution_bits) - 1
        }
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), HalError> {
        let max = self.max_duty();
        if max == 0 {
            return Err(HalError::ResourceUnavailable(format!(
                "{}: PWM not configured",
                self.id
            )));
        }
        if duty > max {
            return Err(HalError::ConfigError(format!(
                "{}: duty {duty} exceeds {max}",
                self.id
            )));
        }
        self.duty = duty;
        self.plant.apply_duty(self.id, duty as f32 / max as f32);
        trace!("{} duty {}/{}", self.id, duty, max);
        Ok(())
    }

    fn duty(&self) -> u32 {
        self.duty
    }
}

// ─── Current Sense ──────────────────────────────────────────────────

/// Multiplexed current-sense converter.
pub struct SimAdc {
    plant: SimPlant,
    selected: Option<SolenoidId>,
}

impl SimAdc {
    pub(crate) fn new(plant: SimPlant) -> Self {
        Self {
            plant,
            selected: None,
        }
    }
}

impl AdcMux for SimAdc {
    fn select(&mut self, channel: u8) -> Result<(), HalError> {
        let id = SolenoidId::ALL
            .get(channel as usize)
            .copied()
            .ok_or_else(|| {
                HalError::ConfigError(format!(
                    "ADC channel {channel} out of range [0, {})",
                    NUM_SOLENOIDS
                ))
            })?;
        self.selected = Some(id);
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [u16]) -> Result<usize, HalError> {
        let id = self
            .selected
            .ok_or_else(|| HalError::CommunicationError("no ADC channel selected".into()))?;
        buf.fill(self.plant.adc_reading(id));
        Ok(buf.len())
    }
}

// ─── Supply ─────────────────────────────────────────────────────────

pub struct SimVoltage {
    plant: SimPlant,
}

impl SimVoltage {
    pub(crate) fn new(plant: SimPlant) -> Self {
        Self { plant }
    }
}

impl VoltageSense for SimVoltage {
    fn supply_mv(&self) -> u16 {
        self.plant.supply_mv()
    }
}

// ─── Bus ────────────────────────────────────────────────────────────

/// Bus transport fed by the plant. Received frames are generated at the
/// configured frame period; transmitted frames are recorded on the plant.
pub struct SimBus {
    plant: SimPlant,
    pending: VecDeque<RawFrame>,
}

impl SimBus {
    pub(crate) fn new(plant: SimPlant) -> Self {
        Self {
            plant,
            pending: VecDeque::with_capacity(4),
        }
    }
}

impl CanBus for SimBus {
    fn receive(&mut self) -> Option<RawFrame> {
        if let Some(frame) = self.pending.pop_front() {
            return Some(frame);
        }
        let frames = self.plant.poll_frames()?;
        self.pending.extend(frames);
        self.pending.pop_front()
    }

    fn transmit(&mut self, frame: RawFrame) -> Result<(), HalError> {
        self.plant.record_transmit(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulationConfig;
    use egs_common::can::{GS_338_ID, GS_418_ID};

    #[test]
    fn pwm_requires_configuration() {
        let mut pwm = SimPwm::new(SolenoidId::Y3, SimPlant::default());
        assert!(pwm.set_duty(1).is_err());
        pwm.configure(1000, 12).unwrap();
        assert_eq!(pwm.max_duty(), 4095);
        pwm.set_duty(4095).unwrap();
        assert_eq!(pwm.duty(), 4095);
        assert!(pwm.set_duty(4096).is_err());
    }

    #[test]
    fn adc_requires_selection() {
        let mut adc = SimAdc::new(SimPlant::default());
        let mut buf = [0u16; 8];
        assert!(adc.read_block(&mut buf).is_err());
        assert!(adc.select(6).is_err());
        adc.select(0).unwrap();
        assert_eq!(adc.read_block(&mut buf).unwrap(), 8);
        assert!(buf.iter().all(|&s| s == 120));
    }

    #[test]
    fn bus_drains_to_none() {
        let plant = SimPlant::new(SimulationConfig {
            frame_period_ms: 60_000,
            ..SimulationConfig::default()
        });
        let mut bus = SimBus::new(plant.clone());
        let ids: Vec<_> = std::iter::from_fn(|| bus.receive()).map(|f| f.id).collect();
        assert_eq!(ids, vec![GS_338_ID, GS_418_ID]);

        bus.transmit(RawFrame {
            id: 0x218,
            payload: 42,
        })
        .unwrap();
        assert_eq!(plant.last_transmitted(0x218), Some(42));
        assert_eq!(plant.transmit_count(), 1);
    }
}
