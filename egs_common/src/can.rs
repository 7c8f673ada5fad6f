//! Bus frame identifiers and typed frame layouts.
//!
//! Every frame on the bus is a 64-bit payload. Signals are packed into it at
//! fixed bit offsets, described as data by [`field::SignalField`] and exposed
//! through thin typed wrappers in [`gs`].

pub mod field;
pub mod gs;

pub use field::{SignalField, SignalValue};
pub use gs::{FaultCheckStatus, GearCode, Gs218, Gs338, Gs418, Gs558, MechVariant, SelectorPosition};

/// Bus frame identifier.
pub type FrameId = u32;

/// Transmission status frame (gears, shifting flag, fault bits).
pub const GS_218_ID: FrameId = 0x218;
/// Transmission speed frame (output and turbine speed).
pub const GS_338_ID: FrameId = 0x338;
/// Transmission state frame (selector lever, variant, oil temperature).
pub const GS_418_ID: FrameId = 0x418;
/// Solenoid duty and converter slip frame.
pub const GS_558_ID: FrameId = 0x558;

/// A typed view over a raw 64-bit bus payload.
pub trait CanFrame: Copy {
    /// Identifier the frame is carried under.
    const ID: FrameId;

    /// Short name used in logs.
    const NAME: &'static str;

    /// Wrap a raw payload. Never fails: every bit pattern is a valid frame.
    fn from_raw(raw: u64) -> Self;

    /// The raw payload.
    fn raw(&self) -> u64;
}
