//! The six solenoid channels as an owned bank.

use super::channel::Solenoid;
use super::sampler::CurrentSampler;
use egs_common::consts::NUM_SOLENOIDS;
use egs_common::control_unit::config::SolenoidConfig;
use egs_common::control_unit::error::CalibrationFault;
use egs_common::control_unit::solenoid::SolenoidId;
use egs_common::hal::driver::{AdcMux, HalDriver, HalError, PwmOutput};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ─── Uncalibrated ───────────────────────────────────────────────────

/// Solenoids before their current-sense baseline is known.
///
/// All channels sit at 0% duty. The only way forward is
/// [`calibrate_all`](Self::calibrate_all).
pub struct UncalibratedBank {
    solenoids: [Solenoid; NUM_SOLENOIDS],
    sampler: CurrentSampler,
    short_threshold: u16,
    refresh_delay: Duration,
}

impl UncalibratedBank {
    /// Take every solenoid PWM and the current-sense ADC from `driver`.
    pub fn new(driver: &mut dyn HalDriver, config: &SolenoidConfig) -> Result<Self, HalError> {
        let mut pwms = Vec::with_capacity(NUM_SOLENOIDS);
        for id in SolenoidId::ALL {
            pwms.push(driver.take_pwm(id)?);
        }
        let adc = driver.take_adc()?;
        Self::from_parts(pwms, adc, config)
    }

    /// Assemble from peripherals in [`SolenoidId::ALL`] order.
    pub fn from_parts(
        pwms: Vec<Box<dyn PwmOutput>>,
        adc: Box<dyn AdcMux>,
        config: &SolenoidConfig,
    ) -> Result<Self, HalError> {
        if pwms.len() != NUM_SOLENOIDS {
            return Err(HalError::InitFailed(format!(
                "expected {NUM_SOLENOIDS} PWM outputs, got {}",
                pwms.len()
            )));
        }

        let mut solenoids = Vec::with_capacity(NUM_SOLENOIDS);
        for (id, pwm) in SolenoidId::ALL.into_iter().zip(pwms) {
            solenoids.push(Solenoid::new(id, pwm)?);
        }
        let solenoids: [Solenoid; NUM_SOLENOIDS] = solenoids
            .try_into()
            .map_err(|_| HalError::InitFailed("solenoid bank incomplete".into()))?;

        Ok(Self {
            solenoids,
            sampler: CurrentSampler::new(adc, config.samples_per_visit),
            short_threshold: config.short_threshold_adc,
            refresh_delay: Duration::from_millis(config.refresh_delay_ms),
        })
    }

    /// Measure every channel's idle reading once and fix it as the
    /// zero-current reference.
    ///
    /// # Errors
    ///
    /// [`CalibrationFault::Shorted`] naming the first channel (in mux order)
    /// whose reference exceeds the short threshold, or
    /// [`CalibrationFault::Sense`] if the ADC cannot be read.
    pub fn calibrate_all(mut self) -> Result<SolenoidBank, CalibrationFault> {
        info!("Calibrating solenoid current sense");

        for solenoid in &self.solenoids {
            let channel = solenoid.id();
            let vref = self
                .sampler
                .sample(channel)
                .map_err(|source| CalibrationFault::Sense { channel, source })?;
            solenoid.store_reading(vref);
            solenoid.fix_vref(vref);
        }

        let summary: Vec<String> = self
            .solenoids
            .iter()
            .map(|s| format!("{}={}", s.id(), s.vref()))
            .collect();
        info!("Solenoid vref: {}", summary.join(" "));

        if let Some(shorted) = self
            .solenoids
            .iter()
            .find(|s| s.vref() > self.short_threshold)
        {
            let fault = CalibrationFault::Shorted {
                channel: shorted.id(),
                vref: shorted.vref(),
                threshold: self.short_threshold,
            };
            error!("{fault}");
            return Err(fault);
        }

        Ok(SolenoidBank {
            solenoids: self.solenoids,
            sampler: Mutex::new(self.sampler),
            refresh_delay: self.refresh_delay,
            sampler_stop: Arc::new(AtomicBool::new(false)),
            sampler_thread: Mutex::new(None),
        })
    }
}

// ─── Calibrated ─────────────────────────────────────────────────────

/// Per-channel snapshot for logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolenoidDiagnostics {
    pub id: SolenoidId,
    /// Tenths of a percent.
    pub commanded_percent: u16,
    pub raw_reading: u16,
    pub vref: u16,
    pub current_ma: f32,
}

/// Calibrated solenoids. Shared as `Arc<SolenoidBank>` between the control
/// loop, the shift worker and the sampler thread.
pub struct SolenoidBank {
    solenoids: [Solenoid; NUM_SOLENOIDS],
    sampler: Mutex<CurrentSampler>,
    refresh_delay: Duration,
    sampler_stop: Arc<AtomicBool>,
    sampler_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SolenoidBank {
    pub fn solenoid(&self, id: SolenoidId) -> &Solenoid {
        &self.solenoids[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Solenoid> {
        self.solenoids.iter()
    }

    pub fn set_duty_percent(&self, id: SolenoidId, percent: u16) -> Result<(), HalError> {
        self.solenoid(id).set_duty_percent(percent)
    }

    pub fn set_duty_percent_compensated(
        &self,
        id: SolenoidId,
        percent: u16,
        supply_mv: u16,
    ) -> Result<(), HalError> {
        self.solenoid(id).set_duty_percent_compensated(percent, supply_mv)
    }

    pub fn diagnostics(&self) -> [SolenoidDiagnostics; NUM_SOLENOIDS] {
        self.solenoids.each_ref().map(|s| SolenoidDiagnostics {
            id: s.id(),
            commanded_percent: s.commanded_percent(),
            raw_reading: s.raw_reading(),
            vref: s.vref(),
            current_ma: s.read_current_estimate(),
        })
    }

    /// Refresh every channel's reading once, in mux order.
    pub fn sample_all(&self) -> Result<(), HalError> {
        let mut sampler = self.sampler.lock();
        for solenoid in &self.solenoids {
            let raw = sampler.sample(solenoid.id())?;
            solenoid.store_reading(raw);
        }
        Ok(())
    }

    /// Visit the next channel of the round robin.
    fn sample_next(&self) {
        let mut sampler = self.sampler.lock();
        let id = sampler.next_channel();
        match sampler.sample(id) {
            Ok(raw) => self.solenoid(id).store_reading(raw),
            Err(e) => warn!("Current sample of {id} failed: {e}"),
        }
    }

    /// Start the background sampler. Returns `false` if it is already
    /// running.
    pub fn start_sampler(self: &Arc<Self>) -> Result<bool, HalError> {
        let mut slot = self.sampler_thread.lock();
        if slot.is_some() {
            return Ok(false);
        }

        let bank: Weak<Self> = Arc::downgrade(self);
        let stop = Arc::clone(&self.sampler_stop);
        let delay = self.refresh_delay;
        stop.store(false, Ordering::Release);

        let handle = thread::Builder::new()
            .name("egs-sampler".into())
            .spawn(move || {
                debug!("Current sampler started ({} ms per visit)", delay.as_millis());
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(delay);
                    match bank.upgrade() {
                        Some(bank) => bank.sample_next(),
                        None => break,
                    }
                }
                debug!("Current sampler stopped");
            })
            .map_err(|e| HalError::ResourceUnavailable(format!("sampler thread: {e}")))?;

        *slot = Some(handle);
        Ok(true)
    }

    pub fn sampler_running(&self) -> bool {
        self.sampler_thread.lock().is_some()
    }

    /// Stop and join the sampler, then drive every channel to 0%.
    pub fn shutdown(&self) {
        self.sampler_stop.store(true, Ordering::Release);
        let handle = self.sampler_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Current sampler panicked");
            }
        }

        for solenoid in &self.solenoids {
            if let Err(e) = solenoid.set_duty_percent(0) {
                error!("Failed to release {}: {e}", solenoid.id());
            }
        }
        info!("All solenoids released");
    }
}

impl std::fmt::Debug for SolenoidBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolenoidBank")
            .field("solenoids", &self.solenoids)
            .field("sampler_running", &self.sampler_running())
            .finish()
    }
}
