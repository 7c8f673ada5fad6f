//! Solenoid actuator driver.
//!
//! Six PWM channels share one multiplexed current-sense ADC. Construction
//! yields an [`UncalibratedBank`], which can only sample. Duty can be
//! commanded once [`UncalibratedBank::calibrate_all`] has fixed every
//! channel's zero-current reference and found no short.

pub mod bank;
pub mod channel;
pub mod sampler;

pub use bank::{SolenoidBank, SolenoidDiagnostics, UncalibratedBank};
pub use channel::Solenoid;
pub use sampler::CurrentSampler;
