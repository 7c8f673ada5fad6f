//! Bit-field descriptors for 64-bit bus payloads.
//!
//! A [`SignalField`] names a contiguous run of bits. Decoding and encoding are
//! pure functions of the payload, so layouts can be declared as tables and
//! checked in tests instead of being hand-written per signal.

use static_assertions::const_assert;

/// Contiguous bit range inside a 64-bit payload, LSB-numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalField {
    /// Bit position of the least significant bit.
    pub offset: u8,
    /// Number of bits, 1..=64.
    pub width: u8,
}

impl SignalField {
    /// Build a descriptor. Panics (at compile time in const contexts) if the
    /// range does not fit in 64 bits.
    pub const fn new(offset: u8, width: u8) -> Self {
        assert!(width > 0 && width <= 64, "signal width must be 1..=64");
        assert!(offset as u16 + width as u16 <= 64, "signal exceeds 64 bits");
        Self { offset, width }
    }

    /// Right-aligned value mask.
    #[inline]
    pub const fn mask(self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Mask of the field's bits in payload position.
    #[inline]
    pub const fn payload_mask(self) -> u64 {
        self.mask() << self.offset
    }

    /// Read the field out of `payload`.
    #[inline]
    pub const fn extract(self, payload: u64) -> u64 {
        (payload >> self.offset) & self.mask()
    }

    /// Return `payload` with the field replaced by `value`.
    ///
    /// Bits of `value` above the field width are dropped.
    #[inline]
    pub const fn insert(self, payload: u64, value: u64) -> u64 {
        (payload & !self.payload_mask()) | ((value & self.mask()) << self.offset)
    }

    /// True when the two fields share at least one bit.
    pub const fn overlaps(self, other: SignalField) -> bool {
        self.payload_mask() & other.payload_mask() != 0
    }
}

const_assert!(SignalField::new(0, 64).mask() == u64::MAX);
const_assert!(SignalField::new(60, 4).payload_mask() == 0xF000_0000_0000_0000);

/// Conversion between a signal's raw bits and its typed value.
///
/// Decoding is total. Enumerations map bit patterns without a defined meaning
/// onto their "signal not available" member.
pub trait SignalValue: Copy {
    /// Decode from right-aligned raw bits.
    fn from_raw(raw: u64) -> Self;
    /// Encode to right-aligned raw bits.
    fn to_raw(self) -> u64;
}

impl SignalValue for bool {
    fn from_raw(raw: u64) -> Self {
        raw != 0
    }
    fn to_raw(self) -> u64 {
        self as u64
    }
}

impl SignalValue for u8 {
    fn from_raw(raw: u64) -> Self {
        raw as u8
    }
    fn to_raw(self) -> u64 {
        self as u64
    }
}

impl SignalValue for u16 {
    fn from_raw(raw: u64) -> Self {
        raw as u16
    }
    fn to_raw(self) -> u64 {
        self as u64
    }
}

/// Generate getter/setter pairs and a `FIELDS` layout table for a frame
/// newtype wrapping a `u64`.
///
/// ```rust
/// use egs_common::frame_signals;
///
/// #[derive(Clone, Copy, Default)]
/// struct Demo(u64);
///
/// frame_signals! {
///     Demo {
///         /// Low nibble.
///         low / set_low: u8 = (0, 4);
///         flag / set_flag: bool = (63, 1);
///     }
/// }
///
/// let mut d = Demo::default();
/// d.set_low(0x1F);
/// d.set_flag(true);
/// assert_eq!(d.low(), 0xF);
/// assert_eq!(d.0, 0x8000_0000_0000_000F);
/// assert_eq!(Demo::FIELDS.len(), 2);
/// ```
#[macro_export]
macro_rules! frame_signals {
    (
        $frame:ident {
            $(
                $(#[$meta:meta])*
                $get:ident / $set:ident : $ty:ty = ($offset:literal, $width:literal);
            )*
        }
    ) => {
        impl $frame {
            /// Signal layout of this frame as `(name, field)` pairs.
            pub const FIELDS: &'static [(&'static str, $crate::can::field::SignalField)] = &[
                $( (stringify!($get), $crate::can::field::SignalField::new($offset, $width)), )*
            ];

            $(
                $(#[$meta])*
                #[inline]
                pub fn $get(&self) -> $ty {
                    <$ty as $crate::can::field::SignalValue>::from_raw(
                        $crate::can::field::SignalField::new($offset, $width).extract(self.0),
                    )
                }

                #[inline]
                pub fn $set(&mut self, value: $ty) {
                    self.0 = $crate::can::field::SignalField::new($offset, $width)
                        .insert(self.0, $crate::can::field::SignalValue::to_raw(value));
                }
            )*
        }
    };
}
