//! Per-frame results and counters

use crate::surface::FrameId;

/// Renderer lifecycle. Construction is all-or-nothing, so a renderer is
/// never observable before it is `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    /// Terminal. Reached through teardown, device loss, or exhausted
    /// allocation retries.
    Destroyed,
}

/// Why a tick produced no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The oldest in-flight frame did not retire in time
    InFlightLimit,
    /// No drawable became available in time
    DrawableTimeout,
    /// The surface had to be reconfigured before it could present again
    SurfaceOutdated,
    /// Drawable acquisition failed for another recoverable reason
    AcquireFailed,
}

/// What one `on_frame` call did. Informational; never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(FrameId),
    Dropped(DropReason),
    /// The renderer is destroyed; nothing was attempted
    Rejected,
}

impl FrameOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, Self::Presented(_))
    }

    pub fn frame_id(&self) -> Option<FrameId> {
        match self {
            Self::Presented(id) => Some(*id),
            _ => None,
        }
    }
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped_in_flight_limit: u64,
    pub dropped_drawable_timeout: u64,
    pub dropped_surface_outdated: u64,
    pub dropped_acquire_failed: u64,
    pub resizes: u64,
    pub last_frame: Option<FrameId>,
}

impl FrameStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_in_flight_limit
            + self.dropped_drawable_timeout
            + self.dropped_surface_outdated
            + self.dropped_acquire_failed
    }

    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::InFlightLimit => self.dropped_in_flight_limit,
            DropReason::DrawableTimeout => self.dropped_drawable_timeout,
            DropReason::SurfaceOutdated => self.dropped_surface_outdated,
            DropReason::AcquireFailed => self.dropped_acquire_failed,
        }
    }

    pub(crate) fn record_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::InFlightLimit => &mut self.dropped_in_flight_limit,
            DropReason::DrawableTimeout => &mut self.dropped_drawable_timeout,
            DropReason::SurfaceOutdated => &mut self.dropped_surface_outdated,
            DropReason::AcquireFailed => &mut self.dropped_acquire_failed,
        };
        *counter += 1;
    }

    pub(crate) fn record_present(&mut self, frame: FrameId) {
        self.presented += 1;
        self.last_frame = Some(frame);
    }
}
