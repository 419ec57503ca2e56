//! Scroller wgpu - GPU backend and window host
//!
//! - [`WgpuProvider`] implements the core's drawable-provider capability on a
//!   `wgpu::Surface`.
//! - [`ScrollerApp`] is a winit application that drives the renderer.
//! - [`Animator`] writes frame state from a background thread.

pub mod animator;
pub mod app;
pub mod config;
pub mod device;

pub use animator::{Animator, palette_color};
pub use app::{HostError, MAX_REBUILDS, ScrollerApp, run};
pub use config::{AnimationConfig, ScrollerConfig, WindowConfig};
pub use device::{FrameUniforms, WgpuDepth, WgpuDrawable, WgpuOptions, WgpuProvider};
