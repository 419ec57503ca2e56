//! Scroller Core - frame scheduling for a clear-and-present renderer
//!
//! This crate owns everything between the host surface's two callbacks
//! (resize and per-frame tick) and the GPU, without depending on any
//! particular graphics API.
//!
//! # Architecture
//!
//! - [`Renderer`] - Frame scheduler and resize handler, driven by the host
//! - [`SharedFrameState`] - Content offset and clear color, writable from any thread
//! - [`DrawableProvider`] - Capability trait implemented by each GPU backend
//! - [`SurfaceBinding`] - Provider plus size-dependent resources
//! - [`HeadlessBackend`] - CPU backend used by tests and offscreen rendering

pub mod config;
pub mod error;
pub mod headless;
pub mod in_flight;
pub mod renderer;
pub mod state;
pub mod surface;

pub use config::{ConfigError, MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::{ErrorReporter, GpuError, InitializationError, LogReporter, RendererError};
pub use headless::{HeadlessBackend, PresentRecord, PresentedImage};
pub use in_flight::InFlightFrames;
pub use renderer::{DropReason, FrameOutcome, FrameStats, Lifecycle, Renderer, SurfaceDelegate};
pub use state::{ClearColor, FrameState, SharedFrameState};
pub use surface::{
    DeviceInfo, DrawableProvider, FrameId, FramePass, PixelFormat, Reconfigured, SurfaceBinding,
    SurfaceSize,
};
