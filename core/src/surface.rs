//! Surface binding and the drawable-provider capability
//!
//! The renderer never touches a platform type directly. It drives a
//! [`DrawableProvider`] (device, command queue and presentable surface) and
//! keeps the size-dependent resources in a [`SurfaceBinding`].

use std::fmt;
use std::time::Duration;

use crate::config::RendererConfig;
use crate::error::{GpuError, InitializationError};
use crate::in_flight::InFlightFrames;
use crate::state::{ClearColor, FrameState};

pub use crate::in_flight::FrameId;

/// Drawable dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Either dimension is zero (e.g. a minimized window).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for SurfaceSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Color format of the presentable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
}

impl PixelFormat {
    /// Writes are encoded with the sRGB transfer function.
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Bgra8UnormSrgb | Self::Rgba8UnormSrgb)
    }
}

/// Adapter identification, logged at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.backend)
    }
}

/// One pass's worth of work: clear the drawable, optionally with depth.
#[derive(Debug)]
pub struct FramePass<'a, D> {
    pub frame_id: FrameId,
    pub size: SurfaceSize,
    pub clear_color: ClearColor,
    /// Delivered to the pass unchanged
    pub content_offset: f32,
    pub depth: Option<&'a D>,
}

/// GPU device, command queue and presentable surface, as seen by the renderer.
///
/// Implementations own every platform handle. The renderer only calls these
/// methods from its own (single) execution context.
pub trait DrawableProvider {
    /// A presentable image acquired for one frame.
    ///
    /// Dropping it without calling [`present`](Self::present) discards it.
    type Drawable;

    /// Depth/stencil attachment sized to the drawable.
    type DepthTarget;

    /// Identify the device. Fails when no usable device exists.
    fn device_info(&self) -> Result<DeviceInfo, GpuError>;

    /// Current drawable size as reported by the host surface.
    fn drawable_size(&self) -> SurfaceSize;

    fn pixel_format(&self) -> PixelFormat;

    /// (Re)configure the surface for `size`.
    fn configure(&mut self, size: SurfaceSize) -> Result<(), GpuError>;

    fn create_depth_target(&mut self, size: SurfaceSize) -> Result<Self::DepthTarget, GpuError>;

    /// Wait at most `timeout` for the next drawable.
    fn acquire_drawable(&mut self, timeout: Duration) -> Result<Self::Drawable, GpuError>;

    /// Encode and submit `pass` targeting `drawable`.
    ///
    /// Once this returns `Ok`, the provider reports `pass.frame_id` through
    /// [`poll_completed`](Self::poll_completed) when the GPU finishes it.
    fn submit(
        &mut self,
        drawable: &Self::Drawable,
        pass: &FramePass<'_, Self::DepthTarget>,
    ) -> Result<(), GpuError>;

    /// Schedule presentation. Ordered after the submission that targeted it.
    fn present(&mut self, drawable: Self::Drawable);

    /// Newest frame whose GPU work has completed, if any.
    fn poll_completed(&mut self) -> Result<Option<FrameId>, GpuError>;

    /// Block up to `timeout` until `frame` completes. Returns `false` on timeout.
    fn wait_for_frame(&mut self, frame: FrameId, timeout: Duration) -> Result<bool, GpuError>;
}

/// Result of a successful [`SurfaceBinding::reconfigure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfigured {
    /// Size matched the current one; nothing was touched
    Unchanged,
    Resized { from: SurfaceSize, to: SurfaceSize },
}

/// The provider plus every resource whose lifetime follows the drawable size.
pub struct SurfaceBinding<P: DrawableProvider> {
    provider: P,
    size: SurfaceSize,
    format: PixelFormat,
    device: DeviceInfo,
    use_depth_buffer: bool,
    depth: Option<P::DepthTarget>,
    in_flight: InFlightFrames<P::DepthTarget>,
    pending: Option<SurfaceSize>,
    consecutive_failures: u32,
}

impl<P: DrawableProvider> SurfaceBinding<P> {
    /// Bind to `provider`, sized to its current drawable.
    ///
    /// All-or-nothing: on error nothing is retained.
    pub fn new(mut provider: P, config: &RendererConfig) -> Result<Self, InitializationError> {
        let device = provider
            .device_info()
            .map_err(|e| InitializationError::NoCompatibleDevice(e.to_string()))?;

        let size = provider.drawable_size();
        if size.is_empty() {
            return Err(InitializationError::InvalidSurfaceSize {
                width: size.width,
                height: size.height,
            });
        }

        provider
            .configure(size)
            .map_err(|e| InitializationError::ResourceAllocation(e.to_string()))?;

        let depth = if config.use_depth_buffer {
            let target = provider
                .create_depth_target(size)
                .map_err(|e| InitializationError::ResourceAllocation(e.to_string()))?;
            Some(target)
        } else {
            None
        };

        let format = provider.pixel_format();
        tracing::info!("Surface bound on {}: {} {:?}", device, size, format);

        Ok(Self {
            provider,
            size,
            format,
            device,
            use_depth_buffer: config.use_depth_buffer,
            depth,
            in_flight: InFlightFrames::new(config.max_frames_in_flight),
            pending: None,
            consecutive_failures: 0,
        })
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn depth_target(&self) -> Option<&P::DepthTarget> {
        self.depth.as_ref()
    }

    /// Size of a reconfigure that failed and will be retried
    pub fn pending_size(&self) -> Option<SurfaceSize> {
        self.pending
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn in_flight(&self) -> &InFlightFrames<P::DepthTarget> {
        &self.in_flight
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Replace size-dependent resources for `size`.
    ///
    /// New resources are created before the old ones are touched, so a
    /// failure leaves the binding exactly as it was, with `size` recorded as
    /// pending. The old depth target is released once every frame submitted
    /// so far has completed.
    pub fn reconfigure(&mut self, size: SurfaceSize) -> Result<Reconfigured, GpuError> {
        if size == self.size {
            if self.pending.take().is_some() {
                tracing::debug!("Resize back to {} cancels pending reconfigure", size);
            }
            self.consecutive_failures = 0;
            return Ok(Reconfigured::Unchanged);
        }

        match self.allocate(size) {
            Ok(new_depth) => {
                let from = self.size;
                if let Some(old) = std::mem::replace(&mut self.depth, new_depth) {
                    self.in_flight.defer_release(old);
                }
                self.size = size;
                self.pending = None;
                self.consecutive_failures = 0;
                Ok(Reconfigured::Resized { from, to: size })
            }
            Err(e) => {
                self.pending = Some(size);
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    fn allocate(&mut self, size: SurfaceSize) -> Result<Option<P::DepthTarget>, GpuError> {
        let depth = if self.use_depth_buffer {
            Some(self.provider.create_depth_target(size)?)
        } else {
            None
        };
        self.provider.configure(size)?;
        Ok(depth)
    }

    /// Reconfigure the surface at the current size (after an outdated acquire).
    pub fn refresh(&mut self) -> Result<(), GpuError> {
        self.provider.configure(self.size)
    }

    /// Retire whatever the GPU has finished. Returns resources released.
    pub fn collect_completed(&mut self) -> Result<usize, GpuError> {
        match self.provider.poll_completed()? {
            Some(frame) => Ok(self.in_flight.complete_through(frame)),
            None => Ok(0),
        }
    }

    /// Wait until another frame may be submitted.
    ///
    /// Returns `false` if the oldest in-flight frame did not retire within
    /// `timeout`.
    pub fn wait_for_capacity(&mut self, timeout: Duration) -> Result<bool, GpuError> {
        while self.in_flight.is_full() {
            let Some(oldest) = self.in_flight.oldest() else {
                break;
            };
            if !self.provider.wait_for_frame(oldest, timeout)? {
                return Ok(false);
            }
            self.in_flight.complete_through(oldest);
        }
        Ok(true)
    }

    pub fn acquire(&mut self, timeout: Duration) -> Result<P::Drawable, GpuError> {
        self.provider.acquire_drawable(timeout)
    }

    /// Encode the clear pass for `state` and submit it as `frame_id`.
    pub fn submit(
        &mut self,
        drawable: &P::Drawable,
        frame_id: FrameId,
        state: &FrameState,
    ) -> Result<(), GpuError> {
        let pass = FramePass {
            frame_id,
            size: self.size,
            clear_color: state.clear_color,
            content_offset: state.content_offset,
            depth: self.depth.as_ref(),
        };
        self.provider.submit(drawable, &pass)?;
        self.in_flight.push(frame_id);
        Ok(())
    }

    pub fn present(&mut self, drawable: P::Drawable) {
        self.provider.present(drawable);
    }

    /// Wait for every in-flight frame, then release all size-dependent
    /// resources. Frames that fail to retire within `timeout` are abandoned.
    pub fn release_all(&mut self, timeout: Duration) {
        while let Some(oldest) = self.in_flight.oldest() {
            match self.provider.wait_for_frame(oldest, timeout) {
                Ok(true) => {
                    self.in_flight.complete_through(oldest);
                }
                Ok(false) => {
                    tracing::warn!("Frame {} did not complete during teardown", oldest);
                    break;
                }
                Err(e) => {
                    tracing::debug!("Teardown wait aborted: {}", e);
                    break;
                }
            }
        }
        self.in_flight.clear();
        self.depth = None;
        self.pending = None;
    }
}

impl<P: DrawableProvider> fmt::Debug for SurfaceBinding<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceBinding")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("device", &self.device)
            .field("has_depth", &self.depth.is_some())
            .field("in_flight", &self.in_flight)
            .field("pending", &self.pending)
            .finish()
    }
}
