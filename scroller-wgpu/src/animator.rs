//! Application-side animation
//!
//! Stands in for application logic: a background thread that scrolls the
//! content offset and blends the clear color through a palette, writing
//! through [`SharedFrameState`] while the renderer reads it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use scroller_core::{ClearColor, SharedFrameState};

use crate::config::AnimationConfig;

/// Update period of the animation thread
const TICK: Duration = Duration::from_millis(4);

/// Background writer of frame state. Stops when dropped.
pub struct Animator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Animator {
    pub fn spawn(state: SharedFrameState, config: AnimationConfig) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("scroller-animator".into())
            .spawn(move || {
                let start = Instant::now();
                while !stop_flag.load(Ordering::Relaxed) {
                    let t = start.elapsed().as_secs_f64();
                    state.update(|s| {
                        s.content_offset = (t * config.scroll_speed) as f32;
                        s.clear_color =
                            palette_color(&config.palette, t / config.color_period_secs);
                    });
                    thread::sleep(TICK);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Animator thread panicked");
            }
        }
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Color at `phase` along `palette`, one full cycle per unit of phase.
///
/// Adjacent entries are blended linearly and the last wraps to the first.
/// An empty palette yields black.
pub fn palette_color(palette: &[ClearColor], phase: f64) -> ClearColor {
    let n = palette.len();
    if n == 0 {
        return ClearColor::BLACK;
    }
    let phase = if phase.is_finite() { phase } else { 0.0 };
    let x = phase.rem_euclid(1.0) * n as f64;
    let index = (x.floor() as usize).min(n - 1);
    palette[index].lerp(palette[(index + 1) % n], x - index as f64)
}
