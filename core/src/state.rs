//! Application-facing frame state
//!
//! [`FrameState`] is plain data. [`SharedFrameState`] is the handle the
//! application writes through (from any thread) and the frame scheduler reads
//! once per tick.
//!
//! # Snapshot consistency
//!
//! The cell is a sequence lock over atomics. Writers move the sequence to an
//! odd value, store every field, then publish the next even value. Readers
//! retry until they see the same even sequence before and after reading the
//! fields, so a snapshot never mixes channels from two different writes.
//! Reads never block a writer and never take a lock.

use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use serde::{Deserialize, Serialize};

/// Background color a render pass clears its color target to.
///
/// Channels are conventionally in `[0, 1]`; values outside that range are
/// passed through to the backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ClearColor {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgba(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::rgba(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::rgba(0.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color
    pub const fn opaque(r: f64, g: f64, b: f64) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Copy with every channel clamped to `[0, 1]`
    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }

    /// Quantize to 8-bit RGBA (clamped, rounded to nearest)
    pub fn to_rgba8(self) -> [u8; 4] {
        let c = self.clamped();
        [
            (c.r * 255.0).round() as u8,
            (c.g * 255.0).round() as u8,
            (c.b * 255.0).round() as u8,
            (c.a * 255.0).round() as u8,
        ]
    }

    /// Linear interpolation between two colors, `t` in `[0, 1]`
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<[f64; 4]> for ClearColor {
    fn from([r, g, b, a]: [f64; 4]) -> Self {
        Self::rgba(r, g, b, a)
    }
}

/// The externally adjustable state one frame is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameState {
    /// Scalar offset with application-defined meaning (e.g. scroll position).
    /// Used verbatim for the whole frame it was sampled for.
    pub content_offset: f32,
    pub clear_color: ClearColor,
}

impl FrameState {
    pub fn new(content_offset: f32, clear_color: ClearColor) -> Self {
        Self {
            content_offset,
            clear_color,
        }
    }
}

struct StateCell {
    seq: AtomicU64,
    content_offset: AtomicU32,
    color: [AtomicU64; 4],
}

impl StateCell {
    fn new(state: FrameState) -> Self {
        let c = state.clear_color;
        Self {
            seq: AtomicU64::new(0),
            content_offset: AtomicU32::new(state.content_offset.to_bits()),
            color: [
                AtomicU64::new(c.r.to_bits()),
                AtomicU64::new(c.g.to_bits()),
                AtomicU64::new(c.b.to_bits()),
                AtomicU64::new(c.a.to_bits()),
            ],
        }
    }

    fn load_fields(&self) -> FrameState {
        let [r, g, b, a] =
            [0, 1, 2, 3].map(|i| f64::from_bits(self.color[i].load(Ordering::Relaxed)));
        FrameState {
            content_offset: f32::from_bits(self.content_offset.load(Ordering::Relaxed)),
            clear_color: ClearColor::rgba(r, g, b, a),
        }
    }

    fn store_fields(&self, state: &FrameState) {
        let c = state.clear_color;
        self.content_offset
            .store(state.content_offset.to_bits(), Ordering::Relaxed);
        for (slot, value) in self.color.iter().zip([c.r, c.g, c.b, c.a]) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    fn read(&self) -> FrameState {
        loop {
            let start = self.seq.load(Ordering::Acquire);
            if start & 1 == 1 {
                hint::spin_loop();
                continue;
            }
            let state = self.load_fields();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == start {
                return state;
            }
            hint::spin_loop();
        }
    }

    fn write(&self, f: impl FnOnce(&mut FrameState)) {
        let guard = WriteGuard::acquire(&self.seq);
        let mut state = self.load_fields();
        f(&mut state);
        self.store_fields(&state);
        drop(guard);
    }
}

/// Exclusive write slot on the sequence; publishes the next even value on
/// drop, including when the update closure panics.
struct WriteGuard<'a> {
    seq: &'a AtomicU64,
    start: u64,
}

impl<'a> WriteGuard<'a> {
    fn acquire(seq: &'a AtomicU64) -> Self {
        loop {
            let start = seq.load(Ordering::Relaxed);
            if start & 1 == 0
                && seq
                    .compare_exchange_weak(start, start + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                fence(Ordering::Release);
                return Self { seq, start };
            }
            hint::spin_loop();
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.seq.store(self.start.wrapping_add(2), Ordering::Release);
    }
}

/// Cloneable, thread-safe handle to the renderer's [`FrameState`].
#[derive(Clone)]
pub struct SharedFrameState {
    cell: Arc<StateCell>,
}

impl SharedFrameState {
    pub fn new(state: FrameState) -> Self {
        Self {
            cell: Arc::new(StateCell::new(state)),
        }
    }

    /// One consistent copy of every field.
    pub fn snapshot(&self) -> FrameState {
        self.cell.read()
    }

    /// Replace the whole state in a single write
    pub fn set(&self, state: FrameState) {
        self.cell.write(|s| *s = state);
    }

    /// Read-modify-write under the write slot; readers see all or nothing.
    pub fn update(&self, f: impl FnOnce(&mut FrameState)) {
        self.cell.write(f);
    }

    pub fn content_offset(&self) -> f32 {
        self.snapshot().content_offset
    }

    pub fn set_content_offset(&self, offset: f32) {
        self.cell.write(|s| s.content_offset = offset);
    }

    pub fn clear_color(&self) -> ClearColor {
        self.snapshot().clear_color
    }

    pub fn set_clear_color(&self, color: ClearColor) {
        self.cell.write(|s| s.clear_color = color);
    }
}

impl Default for SharedFrameState {
    fn default() -> Self {
        Self::new(FrameState::default())
    }
}

impl std::fmt::Debug for SharedFrameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedFrameState")
            .field(&self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_defaults() {
        let state = FrameState::default();
        assert_eq!(state.content_offset, 0.0);
        assert_eq!(state.clear_color, ClearColor::BLACK);

        let shared = SharedFrameState::default();
        assert_eq!(shared.snapshot(), state);
    }

    #[test]
    fn test_field_setters_preserve_other_fields() {
        let shared = SharedFrameState::new(FrameState::new(12.5, ClearColor::BLUE));

        shared.set_content_offset(-40.0);
        assert_eq!(shared.clear_color(), ClearColor::BLUE);
        assert_eq!(shared.content_offset(), -40.0);

        shared.set_clear_color(ClearColor::RED);
        assert_eq!(shared.content_offset(), -40.0);
        assert_eq!(shared.clear_color(), ClearColor::RED);
    }

    #[test]
    fn test_update_applies_read_modify_write() {
        let shared = SharedFrameState::default();
        for _ in 0..10 {
            shared.update(|s| s.content_offset += 1.5);
        }
        assert_eq!(shared.content_offset(), 15.0);
    }

    #[test]
    fn test_clones_share_the_same_cell() {
        let a = SharedFrameState::default();
        let b = a.clone();
        b.set_clear_color(ClearColor::GREEN);
        assert_eq!(a.clear_color(), ClearColor::GREEN);
    }

    #[test]
    fn test_panicking_update_does_not_wedge_readers() {
        let shared = SharedFrameState::default();
        let writer = shared.clone();
        let result = thread::spawn(move || {
            writer.update(|s| {
                s.content_offset = 3.0;
                panic!("application bug");
            });
        })
        .join();
        assert!(result.is_err());

        // The guard published the sequence again; the aborted write left the
        // fields as they were before the closure ran.
        assert_eq!(shared.snapshot(), FrameState::default());
        shared.set_content_offset(7.0);
        assert_eq!(shared.content_offset(), 7.0);
    }

    #[test]
    fn test_rgba8_quantization() {
        assert_eq!(ClearColor::RED.to_rgba8(), [255, 0, 0, 255]);
        assert_eq!(ClearColor::rgba(0.5, 2.0, -1.0, 1.0).to_rgba8(), [128, 255, 0, 255]);
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = ClearColor::BLACK;
        let b = ClearColor::WHITE;
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), ClearColor::opaque(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        // Each color has distinct values in every channel, so a mix of two
        // writes cannot equal either one.
        let first = FrameState::new(100.0, ClearColor::rgba(0.1, 0.2, 0.3, 0.4));
        let second = FrameState::new(-250.0, ClearColor::rgba(0.9, 0.8, 0.7, 0.6));

        let shared = SharedFrameState::new(first);
        let stop = Arc::new(AtomicBool::new(false));

        let writers: Vec<_> = (0..2)
            .map(|w| {
                let shared = shared.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut flip = w == 0;
                    while !stop.load(Ordering::Relaxed) {
                        shared.set(if flip { first } else { second });
                        flip = !flip;
                    }
                })
            })
            .collect();

        for _ in 0..200_000 {
            let snap = shared.snapshot();
            assert!(
                snap == first || snap == second,
                "torn snapshot: {:?}",
                snap
            );
        }

        stop.store(true, Ordering::Relaxed);
        for w in writers {
            w.join().unwrap();
        }
    }
}
