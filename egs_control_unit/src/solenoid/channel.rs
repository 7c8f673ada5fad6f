//! One PWM-driven solenoid with its current-sense state.

use egs_common::consts::{
    ADC_TO_MA, DUTY_PERCENT_MAX, NOMINAL_SOLENOID_VOLTAGE_MV, PWM_RESOLUTION_BITS,
};
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{HalError, PwmOutput};
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU16, Ordering};
use tracing::{trace, warn};

/// Scale a duty request for the measured supply voltage.
///
/// `0` stays `0`. A supply of 0 mV is a failed measurement and leaves the
/// request unscaled.
pub fn compensate_duty(percent: u16, supply_mv: u16) -> u16 {
    if percent == 0 || supply_mv == 0 {
        return percent.min(DUTY_PERCENT_MAX);
    }
    let scaled = percent as u32 * NOMINAL_SOLENOID_VOLTAGE_MV as u32 / supply_mv as u32;
    scaled.min(DUTY_PERCENT_MAX as u32) as u16
}

/// A solenoid channel.
///
/// Duty is expressed in tenths of a percent (`0..=1000`). The PWM output sits
/// behind a lock so the hardware duty and the commanded value always change
/// together.
pub struct Solenoid {
    id: SolenoidId,
    pwm: Mutex<Box<dyn PwmOutput>>,
    max_duty: u32,
    commanded: AtomicU16,
    reading: Mutex<u16>,
    vref: OnceLock<u16>,
}

impl Solenoid {
    /// Configure `pwm` for this channel and drive it to 0%.
    pub(crate) fn new(id: SolenoidId, mut pwm: Box<dyn PwmOutput>) -> Result<Self, HalError> {
        pwm.configure(id.pwm_freq_hz(), PWM_RESOLUTION_BITS)?;
        let max_duty = pwm.max_duty();
        if max_duty == 0 {
            return Err(HalError::ConfigError(format!(
                "{id}: PWM reports zero duty range"
            )));
        }
        pwm.set_duty(0)?;

        Ok(Self {
            id,
            pwm: Mutex::new(pwm),
            max_duty,
            commanded: AtomicU16::new(0),
            reading: Mutex::new(0),
            vref: OnceLock::new(),
        })
    }

    pub fn id(&self) -> SolenoidId {
        self.id
    }

    /// Full-scale raw duty of the PWM output.
    pub fn max_duty(&self) -> u32 {
        self.max_duty
    }

    /// Command a duty in tenths of a percent. Values above 1000 are clamped.
    pub fn set_duty_percent(&self, percent: u16) -> Result<(), HalError> {
        let percent = percent.min(DUTY_PERCENT_MAX);
        let raw = percent as u32 * self.max_duty / DUTY_PERCENT_MAX as u32;

        let mut pwm = self.pwm.lock();
        pwm.set_duty(raw)?;
        self.commanded.store(percent, Ordering::Release);
        trace!("{} duty {}‰ (raw {})", self.id, percent, raw);
        Ok(())
    }

    /// Command a duty scaled for the supply voltage, see [`compensate_duty`].
    pub fn set_duty_percent_compensated(
        &self,
        percent: u16,
        supply_mv: u16,
    ) -> Result<(), HalError> {
        if supply_mv == 0 && percent != 0 {
            warn!(
                "{}: supply voltage unavailable, duty {}‰ not compensated",
                self.id, percent
            );
        }
        self.set_duty_percent(compensate_duty(percent, supply_mv))
    }

    /// Last successfully committed duty, tenths of a percent.
    pub fn commanded_percent(&self) -> u16 {
        self.commanded.load(Ordering::Acquire)
    }

    /// Raw duty currently applied by the PWM output.
    pub fn raw_duty(&self) -> u32 {
        self.pwm.lock().duty()
    }

    /// Zero-current reference. `0` until calibrated.
    pub fn vref(&self) -> u16 {
        self.vref.get().copied().unwrap_or(0)
    }

    pub fn is_calibrated(&self) -> bool {
        self.vref.get().is_some()
    }

    /// Latest averaged current-sense reading [raw counts].
    pub fn raw_reading(&self) -> u16 {
        *self.reading.lock()
    }

    /// Coil current estimate [mA], never negative.
    pub fn read_current_estimate(&self) -> f32 {
        self.raw_reading().saturating_sub(self.vref()) as f32 * ADC_TO_MA
    }

    pub(crate) fn store_reading(&self, raw: u16) {
        *self.reading.lock() = raw;
    }

    /// Fix the zero-current reference. Only the first call has effect.
    pub(crate) fn fix_vref(&self, vref: u16) -> bool {
        self.vref.set(vref).is_ok()
    }
}

impl std::fmt::Debug for Solenoid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solenoid")
            .field("id", &self.id)
            .field("commanded", &self.commanded_percent())
            .field("vref", &self.vref.get())
            .field("reading", &self.raw_reading())
            .finish()
    }
}
