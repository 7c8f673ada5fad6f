//! Bus side of the control unit: the freshness-tracked signal cache.

pub mod cache;

pub use cache::{CacheError, SignalCache};

use egs_common::can::{FrameId, GS_338_ID, GS_418_ID};

/// Frames the gearbox controller consumes.
pub const GEARBOX_FRAMES: [FrameId; 2] = [GS_338_ID, GS_418_ID];
