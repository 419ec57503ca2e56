//! winit host driving the renderer
//!
//! [`ScrollerApp`] owns the window and calls the renderer's two callbacks:
//! `Resized` becomes `on_resize`, `RedrawRequested` becomes `on_frame`. A
//! redraw is requested every time the event loop goes idle, so the frame rate
//! follows the surface's present mode.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use scroller_core::{FrameOutcome, InitializationError, Renderer, SharedFrameState};

use crate::animator::Animator;
use crate::config::ScrollerConfig;
use crate::device::{WgpuOptions, WgpuProvider};

/// Consecutive renderer rebuilds attempted before the host gives up
pub const MAX_REBUILDS: u32 = 3;

/// Failures while bringing the host up.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Renderer(#[from] InitializationError),

    #[error("failed to start animator: {0}")]
    Animator(#[from] std::io::Error),
}

/// Window, renderer and animation for one run of the event loop.
pub struct ScrollerApp {
    config: ScrollerConfig,
    /// Outlives individual renderers so the animator stays attached
    state: SharedFrameState,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuProvider>>,
    animator: Option<Animator>,
    rebuilds: u32,
}

impl ScrollerApp {
    pub fn new(config: ScrollerConfig) -> Self {
        let state = SharedFrameState::new(config.renderer.initial_state());
        Self {
            config,
            state,
            window: None,
            renderer: None,
            animator: None,
            rebuilds: 0,
        }
    }

    pub fn frame_state(&self) -> SharedFrameState {
        self.state.clone()
    }

    fn options(&self) -> WgpuOptions {
        WgpuOptions {
            vsync: self.config.window.vsync,
            frames_in_flight: self.config.renderer.sanitized().max_frames_in_flight as u32,
            ..Default::default()
        }
    }

    fn build_renderer(&self, window: Arc<Window>) -> Result<Renderer<WgpuProvider>, HostError> {
        let provider = WgpuProvider::new(window, &self.options())?;
        let renderer = Renderer::new(provider, self.config.renderer.clone())?;
        Ok(renderer.with_frame_state(self.state.clone()))
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), HostError> {
        let window_attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        self.renderer = Some(self.build_renderer(window.clone())?);
        self.window = Some(window);

        if self.animator.is_none() {
            self.animator = Some(Animator::spawn(
                self.state.clone(),
                self.config.animation.clone(),
            )?);
        }
        Ok(())
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.on_frame() {
            FrameOutcome::Presented(_) => self.rebuilds = 0,
            FrameOutcome::Dropped(reason) => tracing::trace!("Frame dropped: {:?}", reason),
            FrameOutcome::Rejected => {}
        }

        if renderer.is_destroyed() {
            self.rebuild(event_loop);
        }
    }

    /// Replace a destroyed renderer with one on a fresh device.
    fn rebuild(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;

        if self.rebuilds >= MAX_REBUILDS {
            tracing::error!("Renderer failed {} times in a row, exiting", self.rebuilds);
            event_loop.exit();
            return;
        }
        self.rebuilds += 1;

        let Some(window) = self.window.clone() else {
            return;
        };
        match self.build_renderer(window) {
            Ok(renderer) => {
                tracing::info!("Renderer rebuilt (attempt {})", self.rebuilds);
                self.renderer = Some(renderer);
            }
            Err(e) => {
                tracing::error!("Failed to rebuild renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut animator) = self.animator.take() {
            animator.stop();
        }
        if let Some(mut renderer) = self.renderer.take() {
            let stats = renderer.stats();
            renderer.destroy();
            tracing::info!(
                "Presented {} frames, dropped {}",
                stats.presented,
                stats.dropped()
            );
        }
    }
}

impl ApplicationHandler for ScrollerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            tracing::error!("Failed to initialize: {}", e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Window close requested");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.on_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.render(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Open a window and render until it is closed.
pub fn run(config: ScrollerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ScrollerApp::new(config);
    event_loop.run_app(&mut app).context("Event loop error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroller_core::ClearColor;

    #[test]
    fn test_app_state_starts_from_renderer_config() {
        let mut config = ScrollerConfig::default();
        config.renderer.initial_clear_color = ClearColor::GREEN;
        config.renderer.initial_content_offset = 5.0;

        let app = ScrollerApp::new(config);
        let state = app.frame_state().snapshot();
        assert_eq!(state.clear_color, ClearColor::GREEN);
        assert_eq!(state.content_offset, 5.0);
    }

    #[test]
    fn test_options_follow_config() {
        let mut config = ScrollerConfig::default();
        config.window.vsync = false;
        config.renderer.max_frames_in_flight = 9;

        let options = ScrollerApp::new(config).options();
        assert!(!options.vsync);
        assert_eq!(options.frames_in_flight, 3);
    }
}
