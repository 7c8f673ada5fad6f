//! Solenoid channel identities.

use crate::consts::{NUM_SOLENOIDS, SOLENOID_PWM_FREQ_HZ, TCC_PWM_FREQ_HZ};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six valve-body solenoids.
///
/// Declaration order is the ADC multiplexer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolenoidId {
    /// 1-2 / 4-5 shift solenoid.
    Y3,
    /// 3-4 shift solenoid.
    Y4,
    /// 2-3 shift solenoid.
    Y5,
    /// Modulating pressure control.
    Mpc,
    /// Shift pressure control.
    Spc,
    /// Torque converter clutch.
    Tcc,
}

impl SolenoidId {
    /// All channels in multiplexer order.
    pub const ALL: [SolenoidId; NUM_SOLENOIDS] = [
        SolenoidId::Y3,
        SolenoidId::Y4,
        SolenoidId::Y5,
        SolenoidId::Mpc,
        SolenoidId::Spc,
        SolenoidId::Tcc,
    ];

    /// Position in [`SolenoidId::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// ADC multiplexer input for this channel's current sense.
    #[inline]
    pub const fn adc_channel(self) -> u8 {
        self as u8
    }

    pub const fn pwm_freq_hz(self) -> u32 {
        match self {
            SolenoidId::Tcc => TCC_PWM_FREQ_HZ,
            _ => SOLENOID_PWM_FREQ_HZ,
        }
    }

    /// On/off shift solenoid as opposed to a proportional pressure solenoid.
    pub const fn is_shift_solenoid(self) -> bool {
        matches!(self, SolenoidId::Y3 | SolenoidId::Y4 | SolenoidId::Y5)
    }

    pub const fn name(self) -> &'static str {
        match self {
            SolenoidId::Y3 => "Y3",
            SolenoidId::Y4 => "Y4",
            SolenoidId::Y5 => "Y5",
            SolenoidId::Mpc => "MPC",
            SolenoidId::Spc => "SPC",
            SolenoidId::Tcc => "TCC",
        }
    }
}

impl fmt::Display for SolenoidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
