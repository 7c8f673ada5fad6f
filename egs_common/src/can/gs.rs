//! Frames sent by the transmission controller (GS) and the signals the core
//! reads back from them.

use super::field::SignalValue;
use super::{CanFrame, FrameId, GS_218_ID, GS_338_ID, GS_418_ID, GS_558_ID};
use crate::frame_signals;

// ─── Enumerated Signals ─────────────────────────────────────────────

/// 4-bit gear code used by the target (`GZC`) and actual (`GIC`) gear signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum GearCode {
    N = 0,
    D1 = 1,
    D2 = 2,
    D3 = 3,
    D4 = 4,
    D5 = 5,
    D6 = 6,
    D7 = 7,
    /// Continuously variable forward.
    DCvt = 8,
    /// Continuously variable reverse.
    RCvt = 9,
    R3 = 10,
    R = 11,
    R2 = 12,
    P = 13,
    /// Shift interrupted (target) or power-free (actual).
    Interrupted = 14,
    #[default]
    Snv = 15,
}

impl SignalValue for GearCode {
    fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::N,
            1 => Self::D1,
            2 => Self::D2,
            3 => Self::D3,
            4 => Self::D4,
            5 => Self::D5,
            6 => Self::D6,
            7 => Self::D7,
            8 => Self::DCvt,
            9 => Self::RCvt,
            10 => Self::R3,
            11 => Self::R,
            12 => Self::R2,
            13 => Self::P,
            14 => Self::Interrupted,
            _ => Self::Snv,
        }
    }

    fn to_raw(self) -> u64 {
        self as u64
    }
}

/// Gear selector lever position (`WHST`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SelectorPosition {
    P = 0,
    R = 1,
    N = 2,
    D = 4,
    #[default]
    Snv = 7,
}

impl SignalValue for SelectorPosition {
    fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::P,
            1 => Self::R,
            2 => Self::N,
            4 => Self::D,
            _ => Self::Snv,
        }
    }

    fn to_raw(self) -> u64 {
        self as u64
    }
}

/// Gearbox hardware variant (`MECH`). All four codes are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MechVariant {
    #[default]
    Large = 0,
    Small = 1,
    Large2 = 2,
    Small2 = 3,
}

impl SignalValue for MechVariant {
    fn from_raw(raw: u64) -> Self {
        match raw & 0b11 {
            0 => Self::Large,
            1 => Self::Small,
            2 => Self::Large2,
            _ => Self::Small2,
        }
    }

    fn to_raw(self) -> u64 {
        self as u64
    }
}

/// Self-test status (`FEHLPRF_ST`). All four codes are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FaultCheckStatus {
    /// Check has not completed yet.
    #[default]
    Wait = 0,
    Ok = 1,
    Error = 2,
    Unknown = 3,
}

impl SignalValue for FaultCheckStatus {
    fn from_raw(raw: u64) -> Self {
        match raw & 0b11 {
            0 => Self::Wait,
            1 => Self::Ok,
            2 => Self::Error,
            _ => Self::Unknown,
        }
    }

    fn to_raw(self) -> u64 {
        self as u64
    }
}

// ─── Frames ─────────────────────────────────────────────────────────

macro_rules! gs_frame {
    ($(#[$meta:meta])* $name:ident, $id:expr, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub u64);

        impl CanFrame for $name {
            const ID: FrameId = $id;
            const NAME: &'static str = $label;

            fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            fn raw(&self) -> u64 {
                self.0
            }
        }
    };
}

gs_frame!(
    /// Transmission status: gears, shift flag, limp mode and fault bits.
    Gs218,
    GS_218_ID,
    "GS_218"
);
gs_frame!(
    /// Transmission speeds.
    Gs338,
    GS_338_ID,
    "GS_338"
);
gs_frame!(
    /// Transmission state as seen by the instrument cluster and engine.
    Gs418,
    GS_418_ID,
    "GS_418"
);
gs_frame!(
    /// Pressure solenoid duties and converter slip.
    Gs558,
    GS_558_ID,
    "GS_558"
);

frame_signals! {
    Gs218 {
        /// Engine torque request.
        m_egs / set_m_egs: u16 = (48, 13);
        /// Target gear.
        gzc / set_gzc: GearCode = (44, 4);
        /// Actual gear.
        gic / set_gic: GearCode = (40, 4);
        /// Shift in progress.
        schalt / set_schalt: bool = (33, 1);
        /// Limp-home mode active.
        gs_notl / set_gs_notl: bool = (28, 1);
        fehlprf_st / set_fehlprf_st: FaultCheckStatus = (6, 2);
        /// Fault number / fault bit set.
        fehler / set_fehler: u8 = (0, 5);
    }
}

frame_signals! {
    Gs338 {
        /// Output shaft speed [rpm].
        nab / set_nab: u16 = (48, 16);
        /// Turbine (input) speed [rpm].
        nturbine / set_nturbine: u16 = (0, 16);
    }
}

frame_signals! {
    Gs418 {
        /// Driving program / display character.
        fsc / set_fsc: u8 = (56, 8);
        /// Oil temperature, offset by 50 °C.
        t_get / set_t_get: u8 = (40, 8);
        schalt / set_schalt: bool = (37, 1);
        mech / set_mech: MechVariant = (34, 2);
        /// Kickdown.
        kd / set_kd: bool = (32, 1);
        gzc / set_gzc: GearCode = (28, 4);
        gic / set_gic: GearCode = (24, 4);
        /// Selector lever position.
        whst / set_whst: SelectorPosition = (11, 3);
    }
}

frame_signals! {
    Gs558 {
        mpc_duty / set_mpc_duty: u8 = (56, 8);
        spc_duty / set_spc_duty: u8 = (48, 8);
        tcc_duty / set_tcc_duty: u8 = (40, 8);
        /// Converter slip [rpm].
        tcc_slip / set_tcc_slip: u16 = (16, 16);
    }
}

impl Gs418 {
    /// Oil temperature in °C.
    pub fn oil_temp_c(&self) -> i16 {
        self.t_get() as i16 - 50
    }
}
