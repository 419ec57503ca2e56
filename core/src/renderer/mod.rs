//! Frame scheduling and resize handling
//!
//! [`Renderer`] is purely reactive: the host calls [`Renderer::on_resize`]
//! when the drawable changes size and [`Renderer::on_frame`] once per display
//! tick. It owns no thread or timer.

use std::fmt;

use crate::config::RendererConfig;
use crate::error::{ErrorReporter, GpuError, InitializationError, LogReporter, RendererError};
use crate::state::{ClearColor, SharedFrameState};
use crate::surface::{DrawableProvider, FrameId, Reconfigured, SurfaceBinding, SurfaceSize};

mod outcome;


pub use outcome::{DropReason, FrameOutcome, FrameStats, Lifecycle};

/// Callbacks a host surface drives.
pub trait SurfaceDelegate {
    /// The drawable changed size (physical pixels).
    fn on_resize(&mut self, width: u32, height: u32);

    /// Produce one frame.
    fn on_frame(&mut self) -> FrameOutcome;
}

/// Single-pass clear-and-present renderer over a [`DrawableProvider`].
pub struct Renderer<P: DrawableProvider> {
    binding: SurfaceBinding<P>,
    state: SharedFrameState,
    config: RendererConfig,
    reporter: Box<dyn ErrorReporter>,
    lifecycle: Lifecycle,
    next_frame: FrameId,
    stats: FrameStats,
}

impl<P: DrawableProvider> Renderer<P> {
    /// Bind to `provider` and report runtime errors through `tracing`.
    pub fn new(provider: P, config: RendererConfig) -> Result<Self, InitializationError> {
        Self::with_reporter(provider, config, LogReporter)
    }

    /// Bind to `provider`, delivering runtime errors to `reporter`.
    pub fn with_reporter(
        provider: P,
        config: RendererConfig,
        reporter: impl ErrorReporter + 'static,
    ) -> Result<Self, InitializationError> {
        let config = config.sanitized();
        let binding = SurfaceBinding::new(provider, &config)?;
        let state = SharedFrameState::new(config.initial_state());

        tracing::info!(
            "Renderer ready: {} frames in flight, depth buffer {}",
            config.max_frames_in_flight,
            if config.use_depth_buffer { "on" } else { "off" }
        );

        Ok(Self {
            binding,
            state,
            config,
            reporter: Box::new(reporter),
            lifecycle: Lifecycle::Ready,
            next_frame: FrameId::FIRST,
            stats: FrameStats::default(),
        })
    }

    /// Render from an existing handle instead of a fresh one, e.g. to keep
    /// application writers attached across a renderer rebuild.
    pub fn with_frame_state(mut self, state: SharedFrameState) -> Self {
        self.state = state;
        self
    }

    // ========================================================================
    // Host callbacks
    // ========================================================================

    /// React to a drawable size change. Submits no GPU work.
    ///
    /// Zero dimensions (a minimized window) are ignored. Allocation failures
    /// keep the previous resources and are reported through the error
    /// channel; they are retried on the next frame or resize.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if self.is_destroyed() {
            tracing::debug!("Ignoring resize on destroyed renderer");
            return;
        }

        let size = SurfaceSize::new(width, height);
        if size.is_empty() {
            tracing::debug!("Ignoring resize to {}", size);
            return;
        }

        let result = self.binding.reconfigure(size);
        self.apply_reconfigure(size, result);
    }

    /// Render and present one frame from a single snapshot of the frame state.
    pub fn on_frame(&mut self) -> FrameOutcome {
        if self.is_destroyed() {
            return FrameOutcome::Rejected;
        }

        if let Some(size) = self.binding.pending_size() {
            let result = self.binding.reconfigure(size);
            self.apply_reconfigure(size, result);
            if self.is_destroyed() {
                return FrameOutcome::Rejected;
            }
        }

        if let Err(e) = self.binding.collect_completed() {
            return self.fail(e);
        }

        match self.binding.wait_for_capacity(self.config.in_flight_timeout()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    "{} frames still in flight after {:?}, dropping frame",
                    self.binding.in_flight().len(),
                    self.config.in_flight_timeout()
                );
                return self.drop_frame(DropReason::InFlightLimit);
            }
            Err(e) => return self.fail(e),
        }

        let drawable = match self.binding.acquire(self.config.drawable_timeout()) {
            Ok(drawable) => drawable,
            Err(GpuError::Timeout) => {
                let err = RendererError::DrawableTimeout {
                    waited: self.config.drawable_timeout(),
                };
                tracing::debug!("Dropping frame: {}", err);
                return self.drop_frame(DropReason::DrawableTimeout);
            }
            Err(GpuError::Outdated) => {
                tracing::debug!("Surface outdated, reconfiguring at {}", self.binding.size());
                if let Err(e) = self.binding.refresh() {
                    if matches!(e, GpuError::DeviceLost(_)) {
                        return self.fail(e);
                    }
                    tracing::warn!("Surface reconfigure failed: {}", e);
                }
                return self.drop_frame(DropReason::SurfaceOutdated);
            }
            Err(e @ GpuError::DeviceLost(_)) => return self.fail(e),
            Err(e) => {
                tracing::warn!("Failed to acquire drawable: {}", e);
                return self.drop_frame(DropReason::AcquireFailed);
            }
        };

        let state = self.state.snapshot();
        let frame_id = self.next_frame;

        if let Err(e) = self.binding.submit(&drawable, frame_id, &state) {
            drop(drawable);
            return self.fail(e);
        }
        self.next_frame = frame_id.next();
        self.binding.present(drawable);
        self.stats.record_present(frame_id);

        FrameOutcome::Presented(frame_id)
    }

    /// Wait for in-flight frames, release GPU resources and become
    /// [`Lifecycle::Destroyed`]. Later calls are no-ops.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }
        self.teardown();
        tracing::info!(
            "Renderer destroyed after {} frames ({} dropped)",
            self.stats.presented,
            self.stats.dropped()
        );
    }

    // ========================================================================
    // Application state
    // ========================================================================

    /// Handle the application writes frame state through, from any thread.
    pub fn frame_state(&self) -> SharedFrameState {
        self.state.clone()
    }

    pub fn content_offset(&self) -> f32 {
        self.state.content_offset()
    }

    pub fn set_content_offset(&self, offset: f32) {
        self.state.set_content_offset(offset);
    }

    pub fn clear_color(&self) -> ClearColor {
        self.state.clear_color()
    }

    pub fn set_clear_color(&self, color: ClearColor) {
        self.state.set_clear_color(color);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == Lifecycle::Destroyed
    }

    pub fn surface_size(&self) -> SurfaceSize {
        self.binding.size()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.binding.in_flight().len()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Effective (sanitized) configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn binding(&self) -> &SurfaceBinding<P> {
        &self.binding
    }

    pub fn provider(&self) -> &P {
        self.binding.provider()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn apply_reconfigure(&mut self, size: SurfaceSize, result: Result<Reconfigured, GpuError>) {
        match result {
            Ok(Reconfigured::Unchanged) => {}
            Ok(Reconfigured::Resized { from, to }) => {
                tracing::debug!("Surface resized {} -> {}", from, to);
                self.stats.resizes += 1;
            }
            Err(e @ GpuError::DeviceLost(_)) => {
                self.fail(e);
            }
            Err(e) => {
                let attempts = self.binding.consecutive_failures();
                if attempts >= self.config.max_allocation_failures {
                    self.report(RendererError::ResourceAllocationExhausted { size, attempts });
                    self.teardown();
                } else {
                    self.report(RendererError::ResourceAllocation {
                        size,
                        reason: e.to_string(),
                        consecutive_failures: attempts,
                    });
                }
            }
        }
    }

    fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
        self.stats.record_drop(reason);
        FrameOutcome::Dropped(reason)
    }

    /// Fatal backend failure: report once, tear down, reject the frame.
    fn fail(&mut self, error: GpuError) -> FrameOutcome {
        let reason = match error {
            GpuError::DeviceLost(reason) => reason,
            other => other.to_string(),
        };
        self.report(RendererError::DeviceLost(reason));
        self.teardown();
        FrameOutcome::Rejected
    }

    fn report(&mut self, error: RendererError) {
        self.reporter.report(&error);
    }

    fn teardown(&mut self) {
        self.binding.release_all(self.config.in_flight_timeout());
        self.lifecycle = Lifecycle::Destroyed;
    }
}

impl<P: DrawableProvider> SurfaceDelegate for Renderer<P> {
    fn on_resize(&mut self, width: u32, height: u32) {
        Renderer::on_resize(self, width, height);
    }

    fn on_frame(&mut self) -> FrameOutcome {
        Renderer::on_frame(self)
    }
}

impl<P: DrawableProvider> Drop for Renderer<P> {
    fn drop(&mut self) {
        if !self.is_destroyed() {
            self.teardown();
        }
    }
}

impl<P: DrawableProvider> fmt::Debug for Renderer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("lifecycle", &self.lifecycle)
            .field("binding", &self.binding)
            .field("next_frame", &self.next_frame)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
