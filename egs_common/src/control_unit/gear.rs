//! Gear model and ratio table.
//!
//! The ratio table maps a measured input/output speed ratio onto a gear. Each
//! gear owns a window `[min, max]` derived from its nominal mechanical ratio
//! and a tolerance. Windows are built once and never change.

use crate::can::GearCode;
use crate::can::MechVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─── Gear ───────────────────────────────────────────────────────────

/// Physical or requested gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gear {
    Park,
    Reverse2,
    Reverse1,
    Neutral,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    /// Unknown / not yet determined.
    #[default]
    SignalNotAvailable,
}

impl Gear {
    /// Forward gears in ascending order.
    pub const FORWARD: [Gear; 5] = [
        Gear::First,
        Gear::Second,
        Gear::Third,
        Gear::Fourth,
        Gear::Fifth,
    ];

    /// Reverse gears in classification order (highest ratio first).
    pub const REVERSE: [Gear; 2] = [Gear::Reverse1, Gear::Reverse2];

    #[inline]
    pub const fn is_forward(self) -> bool {
        self.forward_number().is_some()
    }

    #[inline]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Gear::Reverse1 | Gear::Reverse2)
    }

    /// 1-based forward gear number.
    pub const fn forward_number(self) -> Option<u8> {
        match self {
            Gear::First => Some(1),
            Gear::Second => Some(2),
            Gear::Third => Some(3),
            Gear::Fourth => Some(4),
            Gear::Fifth => Some(5),
            _ => None,
        }
    }

    /// Inverse of [`Gear::forward_number`].
    pub const fn from_forward_number(n: u8) -> Option<Gear> {
        match n {
            1 => Some(Gear::First),
            2 => Some(Gear::Second),
            3 => Some(Gear::Third),
            4 => Some(Gear::Fourth),
            5 => Some(Gear::Fifth),
            _ => None,
        }
    }

    /// Next forward gear up, if any.
    pub fn next_up(self) -> Option<Gear> {
        self.forward_number()
            .and_then(|n| Gear::from_forward_number(n + 1))
    }

    /// Next forward gear down, if any.
    pub fn next_down(self) -> Option<Gear> {
        self.forward_number()
            .and_then(|n| Gear::from_forward_number(n.saturating_sub(1)))
    }

    /// Bus gear code for this gear.
    pub const fn code(self) -> GearCode {
        match self {
            Gear::Park => GearCode::P,
            Gear::Reverse2 => GearCode::R2,
            Gear::Reverse1 => GearCode::R,
            Gear::Neutral => GearCode::N,
            Gear::First => GearCode::D1,
            Gear::Second => GearCode::D2,
            Gear::Third => GearCode::D3,
            Gear::Fourth => GearCode::D4,
            Gear::Fifth => GearCode::D5,
            Gear::SignalNotAvailable => GearCode::Snv,
        }
    }

    /// Gear for a bus gear code. Codes this gearbox cannot realise map to
    /// `SignalNotAvailable`.
    pub const fn from_code(code: GearCode) -> Gear {
        match code {
            GearCode::P => Gear::Park,
            GearCode::R2 => Gear::Reverse2,
            GearCode::R => Gear::Reverse1,
            GearCode::N => Gear::Neutral,
            GearCode::D1 => Gear::First,
            GearCode::D2 => Gear::Second,
            GearCode::D3 => Gear::Third,
            GearCode::D4 => Gear::Fourth,
            GearCode::D5 => Gear::Fifth,
            _ => Gear::SignalNotAvailable,
        }
    }
}

impl From<Gear> for GearCode {
    fn from(gear: Gear) -> Self {
        gear.code()
    }
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gear::Park => "P",
            Gear::Reverse2 => "R2",
            Gear::Reverse1 => "R1",
            Gear::Neutral => "N",
            Gear::First => "D1",
            Gear::Second => "D2",
            Gear::Third => "D3",
            Gear::Fourth => "D4",
            Gear::Fifth => "D5",
            Gear::SignalNotAvailable => "SNV",
        };
        f.write_str(s)
    }
}

/// Direction of a single-step shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftDirection {
    Up,
    Down,
}

impl ShiftDirection {
    /// Direction from `from` to `to` when both are forward gears one step
    /// apart.
    pub fn between(from: Gear, to: Gear) -> Option<Self> {
        let (a, b) = (from.forward_number()?, to.forward_number()?);
        match b as i8 - a as i8 {
            1 => Some(Self::Up),
            -1 => Some(Self::Down),
            _ => None,
        }
    }
}

// ─── Transmission Variant ───────────────────────────────────────────

/// Gearbox hardware variant, selecting the nominal ratio set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionVariant {
    Small,
    #[default]
    Large,
}

impl TransmissionVariant {
    /// Nominal forward ratios, first to fifth.
    pub const fn forward_ratios(self) -> [f64; 5] {
        match self {
            Self::Small => [3.9319, 2.4079, 1.4857, 1.0000, 0.8305],
            Self::Large => [3.5876, 2.1862, 1.4054, 1.0000, 0.8314],
        }
    }

    /// Nominal reverse ratio magnitudes, R1 then R2.
    pub const fn reverse_ratios(self) -> [f64; 2] {
        match self {
            Self::Small => [3.1002, 1.8986],
            Self::Large => [3.1605, 1.9259],
        }
    }
}

impl From<MechVariant> for TransmissionVariant {
    fn from(mech: MechVariant) -> Self {
        match mech {
            MechVariant::Small | MechVariant::Small2 => Self::Small,
            MechVariant::Large | MechVariant::Large2 => Self::Large,
        }
    }
}

// ─── Ratio Table ────────────────────────────────────────────────────

/// Errors raised while building a [`GearRatioTable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GearTableError {
    #[error("ratio tolerance {0} outside (0, 1)")]
    InvalidTolerance(f64),

    #[error("nominal ratio {ratio} of {gear} is not a positive finite number")]
    InvalidRatio { gear: Gear, ratio: f64 },

    #[error("nominal ratio {ratio} of {gear} is not below {previous} of the gear before it")]
    NotDecreasing { gear: Gear, ratio: f64, previous: f64 },

    #[error("windows of {lower} and {higher} overlap")]
    Overlap { lower: Gear, higher: Gear },
}

/// Inclusive ratio range classified as `gear`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioWindow {
    pub gear: Gear,
    pub min: f64,
    pub max: f64,
}

impl RatioWindow {
    #[inline]
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.min && ratio <= self.max
    }
}

/// Immutable forward and reverse ratio windows.
///
/// Windows within each group are ordered by descending ratio. Neighbouring
/// windows may share a single boundary value; whichever comes first in scan
/// order wins there.
#[derive(Debug, Clone, PartialEq)]
pub struct GearRatioTable {
    forward: [RatioWindow; 5],
    reverse: [RatioWindow; 2],
}

impl GearRatioTable {
    /// Build the table for a gearbox variant.
    pub fn for_variant(
        variant: TransmissionVariant,
        tolerance: f64,
    ) -> Result<Self, GearTableError> {
        Self::from_ratios(variant.forward_ratios(), variant.reverse_ratios(), tolerance)
    }

    /// Build a table from nominal ratios.
    ///
    /// # Errors
    ///
    /// Fails if the tolerance is outside `(0, 1)`, a ratio is not positive,
    /// or ratios are not strictly decreasing in gear order.
    pub fn from_ratios(
        forward: [f64; 5],
        reverse: [f64; 2],
        tolerance: f64,
    ) -> Result<Self, GearTableError> {
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(GearTableError::InvalidTolerance(tolerance));
        }

        let mut fwd = Gear::FORWARD.map(|gear| RatioWindow {
            gear,
            min: 0.0,
            max: 0.0,
        });
        for (window, &ratio) in fwd.iter_mut().zip(forward.iter()) {
            *window = nominal_window(window.gear, ratio, tolerance)?;
        }
        let mut rev = Gear::REVERSE.map(|gear| RatioWindow {
            gear,
            min: 0.0,
            max: 0.0,
        });
        for (window, &ratio) in rev.iter_mut().zip(reverse.iter()) {
            *window = nominal_window(window.gear, ratio, tolerance)?;
        }

        check_decreasing(&Gear::FORWARD, &forward)?;
        check_decreasing(&Gear::REVERSE, &reverse)?;
        split_overlaps(&mut fwd);
        split_overlaps(&mut rev);
        check_disjoint(&fwd)?;
        check_disjoint(&rev)?;

        Ok(Self {
            forward: fwd,
            reverse: rev,
        })
    }

    pub fn forward(&self) -> &[RatioWindow] {
        &self.forward
    }

    pub fn reverse(&self) -> &[RatioWindow] {
        &self.reverse
    }

    /// First window in scan order containing `ratio`.
    pub fn lookup(&self, ratio: f64, reverse: bool) -> Option<Gear> {
        let windows: &[RatioWindow] = if reverse {
            &self.reverse
        } else {
            &self.forward
        };
        windows.iter().find(|w| w.contains(ratio)).map(|w| w.gear)
    }
}

fn nominal_window(gear: Gear, ratio: f64, tolerance: f64) -> Result<RatioWindow, GearTableError> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(GearTableError::InvalidRatio { gear, ratio });
    }
    Ok(RatioWindow {
        gear,
        min: ratio * (1.0 - tolerance),
        max: ratio * (1.0 + tolerance),
    })
}

fn check_decreasing(gears: &[Gear], ratios: &[f64]) -> Result<(), GearTableError> {
    for i in 1..ratios.len() {
        if ratios[i] >= ratios[i - 1] {
            return Err(GearTableError::NotDecreasing {
                gear: gears[i],
                ratio: ratios[i],
                previous: ratios[i - 1],
            });
        }
    }
    Ok(())
}

/// Where the window of a lower ratio reaches into its predecessor, move both
/// edges to the midpoint of the overlap.
fn split_overlaps(windows: &mut [RatioWindow]) {
    for i in 1..windows.len() {
        let (higher, lower) = (windows[i - 1], windows[i]);
        if lower.max > higher.min {
            let mid = (lower.max + higher.min) / 2.0;
            windows[i - 1].min = mid;
            windows[i].max = mid;
        }
    }
}

fn check_disjoint(windows: &[RatioWindow]) -> Result<(), GearTableError> {
    for i in 1..windows.len() {
        if windows[i].max > windows[i - 1].min || windows[i].min >= windows[i].max {
            return Err(GearTableError::Overlap {
                lower: windows[i].gear,
                higher: windows[i - 1].gear,
            });
        }
    }
    Ok(())
}
