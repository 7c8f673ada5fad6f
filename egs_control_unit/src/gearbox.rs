//! Gear determination and shift coordination.

pub mod classifier;
pub mod controller;
pub mod profile;
pub mod shared;
pub mod shift;

pub use classifier::GearClassifier;
pub use controller::{CycleOutput, GearboxController};
pub use profile::{DriveConditions, ManualProfile, Profile, RpmLimitProfile};
pub use shared::{GearboxHandle, GearboxStatus};
pub use shift::{ShiftOutcome, ShiftSupervisor};
