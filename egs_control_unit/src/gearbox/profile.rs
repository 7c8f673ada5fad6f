//! Driving profiles: pluggable shift-point logic.
//!
//! The controller consults the active profile only while it sits in D with
//! no shift pending and no fault latched. Whatever the profile proposes is
//! clamped to the forward range before it becomes the target.

use egs_common::consts::{REDLINE_RPM, STALL_RPM};
use egs_common::control_unit::gear::Gear;

/// Snapshot handed to [`Profile::propose_target`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveConditions {
    pub input_rpm: u32,
    pub output_rpm: u32,
    pub actual_gear: Gear,
    pub target_gear: Gear,
    pub oil_temp_c: i16,
    pub kickdown: bool,
}

pub trait Profile: Send + Sync {
    fn name(&self) -> &str;

    /// New target gear, or `None` to keep the current one.
    fn propose_target(&self, conditions: &DriveConditions) -> Option<Gear>;
}

/// Driver requests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualProfile;

impl Profile for ManualProfile {
    fn name(&self) -> &str {
        "manual"
    }

    fn propose_target(&self, _conditions: &DriveConditions) -> Option<Gear> {
        None
    }
}

/// Keeps the engine between a stall and a redline speed.
#[derive(Debug, Clone, Copy)]
pub struct RpmLimitProfile {
    pub upshift_rpm: u32,
    pub downshift_rpm: u32,
}

impl Default for RpmLimitProfile {
    fn default() -> Self {
        Self {
            upshift_rpm: REDLINE_RPM,
            downshift_rpm: STALL_RPM,
        }
    }
}

impl Profile for RpmLimitProfile {
    fn name(&self) -> &str {
        "rpm-limit"
    }

    fn propose_target(&self, c: &DriveConditions) -> Option<Gear> {
        if c.input_rpm >= self.upshift_rpm {
            return c.actual_gear.next_up();
        }
        if c.input_rpm <= self.downshift_rpm || c.kickdown {
            return c.actual_gear.next_down();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(input_rpm: u32, actual_gear: Gear) -> DriveConditions {
        DriveConditions {
            input_rpm,
            output_rpm: 1000,
            actual_gear,
            target_gear: actual_gear,
            oil_temp_c: 80,
            kickdown: false,
        }
    }

    #[test]
    fn manual_never_proposes() {
        assert_eq!(ManualProfile.propose_target(&conditions(6000, Gear::Second)), None);
    }

    #[test]
    fn rpm_limit_shift_points() {
        let p = RpmLimitProfile::default();
        assert_eq!(p.propose_target(&conditions(4000, Gear::Second)), Some(Gear::Third));
        assert_eq!(p.propose_target(&conditions(2500, Gear::Second)), None);
        assert_eq!(p.propose_target(&conditions(700, Gear::Third)), Some(Gear::Second));
        assert_eq!(p.propose_target(&conditions(4500, Gear::Fifth)), None);
        assert_eq!(p.propose_target(&conditions(600, Gear::First)), None);
    }

    #[test]
    fn kickdown_requests_lower_gear() {
        let p = RpmLimitProfile::default();
        let mut c = conditions(2500, Gear::Fourth);
        c.kickdown = true;
        assert_eq!(p.propose_target(&c), Some(Gear::Third));
    }
}
