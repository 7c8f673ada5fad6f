//! State shared between the control loop and request callers.
//!
//! Two locks, each held only long enough to copy or replace a value:
//! the request cell (target gear and active profile) and the status cell
//! written once per cycle by the loop.

use super::profile::{ManualProfile, Profile};
use egs_common::can::SelectorPosition;
use egs_common::control_unit::error::RuntimeFault;
use egs_common::control_unit::gear::{Gear, ShiftDirection};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct RequestState {
    pub(crate) target: Gear,
    pub(crate) profile: Arc<dyn Profile>,
}

/// Controller state as of the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GearboxStatus {
    pub target_gear: Gear,
    pub actual_gear: Gear,
    pub shifting: bool,
    pub direction: Option<ShiftDirection>,
    pub faults: RuntimeFault,
    pub selector: SelectorPosition,
    pub input_rpm: u32,
    pub output_rpm: u32,
}

pub(crate) struct GearboxShared {
    pub(crate) request: Mutex<RequestState>,
    pub(crate) status: Mutex<GearboxStatus>,
    pub(crate) min_forward: Gear,
}

impl GearboxShared {
    pub(crate) fn new(min_forward: Gear) -> Self {
        Self {
            request: Mutex::new(RequestState {
                target: Gear::SignalNotAvailable,
                profile: Arc::new(ManualProfile),
            }),
            status: Mutex::new(GearboxStatus::default()),
            min_forward,
        }
    }

    /// Clamp a forward gear into `[min_forward, Fifth]`.
    pub(crate) fn clamp_forward(&self, gear: Gear) -> Gear {
        match (gear.forward_number(), self.min_forward.forward_number()) {
            (Some(n), Some(min)) if n < min => self.min_forward,
            _ => gear,
        }
    }
}

/// Cloneable handle for driver requests and status observers.
#[derive(Clone)]
pub struct GearboxHandle {
    shared: Arc<GearboxShared>,
}

impl GearboxHandle {
    pub(crate) fn new(shared: Arc<GearboxShared>) -> Self {
        Self { shared }
    }

    /// Move the target one forward gear up. Returns the new target, or
    /// `None` if the target is not a forward gear (request rejected).
    pub fn request_gear_up(&self) -> Option<Gear> {
        self.step_target(Gear::next_up)
    }

    /// Move the target one forward gear down, not below the lowest
    /// permitted starting gear.
    pub fn request_gear_down(&self) -> Option<Gear> {
        self.step_target(Gear::next_down)
    }

    fn step_target(&self, step: fn(Gear) -> Option<Gear>) -> Option<Gear> {
        let mut request = self.shared.request.lock();
        if !request.target.is_forward() {
            debug!("Gear request ignored, target is {}", request.target);
            return None;
        }
        let next = self
            .shared
            .clamp_forward(step(request.target).unwrap_or(request.target));
        if next != request.target {
            debug!("Target gear {} -> {}", request.target, next);
        }
        request.target = next;
        Some(next)
    }

    /// Swap the active profile.
    pub fn set_profile(&self, profile: Arc<dyn Profile>) {
        let previous = {
            let mut request = self.shared.request.lock();
            std::mem::replace(&mut request.profile, profile)
        };
        info!(
            "Profile {} -> {}",
            previous.name(),
            self.profile_name()
        );
    }

    pub fn profile_name(&self) -> String {
        self.shared.request.lock().profile.name().to_string()
    }

    pub fn target_gear(&self) -> Gear {
        self.shared.request.lock().target
    }

    pub fn status(&self) -> GearboxStatus {
        *self.shared.status.lock()
    }
}
