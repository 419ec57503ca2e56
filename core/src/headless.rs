//! Headless drawable provider
//!
//! A CPU implementation of [`DrawableProvider`]: clears are rasterized into
//! RGBA8 pixels, presentation order is recorded, and GPU completion is either
//! immediate or driven by hand. Faults (acquire timeouts, device loss,
//! allocation failures, a missing device) can be injected at any point.
//!
//! [`HeadlessBackend`] is a cheap clone over shared state: move one clone into
//! the renderer and keep another to steer and inspect it. Waits are simulated
//! and never sleep.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::GpuError;
use crate::state::ClearColor;
use crate::surface::{DeviceInfo, DrawableProvider, FrameId, FramePass, PixelFormat, SurfaceSize};

/// Presentable images in the simulated swapchain
pub const DEFAULT_SWAPCHAIN_IMAGES: usize = 3;

/// Full images retained for inspection; older ones keep only their record
pub const RETAINED_IMAGES: usize = 16;

/// Present records and submitted frame ids retained, oldest dropped first
pub const RETAINED_RECORDS: usize = 4096;

/// A presented frame with its pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedImage {
    pub frame_id: FrameId,
    pub size: SurfaceSize,
    pub format: PixelFormat,
    /// Row-major RGBA8, `size.pixel_count()` entries
    pub pixels: Vec<[u8; 4]>,
    /// Color the pass cleared to, before format encoding
    pub clear_color: ClearColor,
    pub content_offset: f32,
    /// Size of the depth target bound to the pass, if any
    pub depth_size: Option<SurfaceSize>,
}

impl PresentedImage {
    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.size.width as usize + x as usize)
            .copied()
    }

    /// Every pixel equals `rgba`.
    pub fn is_uniform(&self, rgba: [u8; 4]) -> bool {
        self.pixels.iter().all(|&p| p == rgba)
    }
}

/// Compact log entry kept for every presented frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentRecord {
    pub frame_id: FrameId,
    pub size: SurfaceSize,
    pub clear_color: ClearColor,
    pub content_offset: f32,
}

/// Depth attachment allocated by the headless backend.
#[derive(Debug)]
pub struct HeadlessDepth {
    size: SurfaceSize,
    live: Arc<AtomicUsize>,
}

impl HeadlessDepth {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }
}

impl Drop for HeadlessDepth {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A swapchain image on loan to the renderer. Returned to the pool on drop.
#[derive(Debug)]
pub struct HeadlessDrawable {
    id: u64,
    size: SurfaceSize,
    shared: Arc<Mutex<Inner>>,
}

impl HeadlessDrawable {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }
}

impl Drop for HeadlessDrawable {
    fn drop(&mut self) {
        let mut inner = lock(&self.shared);
        inner.drawables_out = inner.drawables_out.saturating_sub(1);
        // Rendered but never presented: the image is discarded.
        inner.rendered.remove(&self.id);
    }
}

#[derive(Debug, Default)]
struct Faults {
    no_device: bool,
    acquire_timeouts: u32,
    outdated_acquires: u32,
    lose_device_on_submit: Option<String>,
    depth_failures: u32,
}

#[derive(Debug)]
struct Inner {
    drawable_size: SurfaceSize,
    configured: Option<SurfaceSize>,
    format: PixelFormat,
    swapchain_images: usize,
    drawables_out: usize,
    next_drawable: u64,
    rendered: HashMap<u64, PresentedImage>,

    manual_completion: bool,
    gpu_queue: VecDeque<FrameId>,
    completed: Option<FrameId>,
    device_lost: Option<String>,

    images: VecDeque<PresentedImage>,
    records: VecDeque<PresentRecord>,
    submissions: VecDeque<FrameId>,
    configure_calls: usize,
    depth_created: usize,
    faults: Faults,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, limit: usize) {
    if queue.len() == limit {
        queue.pop_front();
    }
    queue.push_back(value);
}

/// CPU-backed drawable provider. Clones share one simulated device.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    shared: Arc<Mutex<Inner>>,
    live_depth: Arc<AtomicUsize>,
}

impl HeadlessBackend {
    /// A device whose host surface currently measures `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        let inner = Inner {
            drawable_size: SurfaceSize::new(width, height),
            configured: None,
            format: PixelFormat::Rgba8Unorm,
            swapchain_images: DEFAULT_SWAPCHAIN_IMAGES,
            drawables_out: 0,
            next_drawable: 0,
            rendered: HashMap::new(),
            manual_completion: false,
            gpu_queue: VecDeque::new(),
            completed: None,
            device_lost: None,
            images: VecDeque::new(),
            records: VecDeque::new(),
            submissions: VecDeque::new(),
            configure_calls: 0,
            depth_created: 0,
            faults: Faults::default(),
        };
        Self {
            shared: Arc::new(Mutex::new(inner)),
            live_depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_format(self, format: PixelFormat) -> Self {
        lock(&self.shared).format = format;
        self
    }

    pub fn with_swapchain_images(self, count: usize) -> Self {
        lock(&self.shared).swapchain_images = count.max(1);
        self
    }

    /// Simulate a machine without a usable adapter.
    pub fn without_device(self) -> Self {
        lock(&self.shared).faults.no_device = true;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared)
    }

    // ========================================================================
    // Host controls
    // ========================================================================

    /// Change the size the host surface reports (e.g. window resized).
    pub fn set_drawable_size(&self, width: u32, height: u32) {
        self.inner().drawable_size = SurfaceSize::new(width, height);
    }

    /// Hold GPU completion until [`complete_through`](Self::complete_through)
    /// or [`complete_all`](Self::complete_all) is called.
    pub fn stall_gpu(&self) {
        self.inner().manual_completion = true;
    }

    /// Complete everything queued and go back to immediate completion.
    pub fn resume_gpu(&self) {
        let mut inner = self.inner();
        inner.manual_completion = false;
        inner.complete_all();
    }

    pub fn complete_through(&self, frame: FrameId) {
        self.inner().complete_through(frame);
    }

    pub fn complete_all(&self) {
        self.inner().complete_all();
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    pub fn fail_next_acquires(&self, count: u32) {
        self.inner().faults.acquire_timeouts = count;
    }

    pub fn outdate_next_acquire(&self) {
        self.inner().faults.outdated_acquires += 1;
    }

    pub fn lose_device_on_next_submit(&self, reason: impl Into<String>) {
        self.inner().faults.lose_device_on_submit = Some(reason.into());
    }

    /// Lose the device right now; every later call fails.
    pub fn lose_device(&self, reason: impl Into<String>) {
        self.inner().device_lost = Some(reason.into());
    }

    pub fn fail_depth_allocations(&self, count: u32) {
        self.inner().faults.depth_failures = count;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Frame ids in presentation order
    pub fn presented_frames(&self) -> Vec<FrameId> {
        self.inner().records.iter().map(|r| r.frame_id).collect()
    }

    /// The most recent [`RETAINED_RECORDS`] presentations, oldest first
    pub fn records(&self) -> Vec<PresentRecord> {
        self.inner().records.iter().copied().collect()
    }

    pub fn last_image(&self) -> Option<PresentedImage> {
        self.inner().images.back().cloned()
    }

    /// Frame ids in submission order, presented or not
    pub fn submitted_frames(&self) -> Vec<FrameId> {
        self.inner().submissions.iter().copied().collect()
    }

    /// Submitted frames the simulated GPU has not finished
    pub fn gpu_queue_len(&self) -> usize {
        self.inner().gpu_queue.len()
    }

    pub fn configured_size(&self) -> Option<SurfaceSize> {
        self.inner().configured
    }

    pub fn configure_calls(&self) -> usize {
        self.inner().configure_calls
    }

    pub fn depth_targets_created(&self) -> usize {
        self.inner().depth_created
    }

    /// Depth targets allocated and not yet dropped
    pub fn live_depth_targets(&self) -> usize {
        self.live_depth.load(Ordering::Acquire)
    }

    /// Drawables acquired and not yet presented or dropped
    pub fn drawables_outstanding(&self) -> usize {
        self.inner().drawables_out
    }

    /// Drawables rendered into but neither presented nor discarded yet
    pub fn unpresented_images(&self) -> usize {
        self.inner().rendered.len()
    }

    pub fn is_device_lost(&self) -> bool {
        self.inner().device_lost.is_some()
    }
}

impl Inner {
    fn check_device(&self) -> Result<(), GpuError> {
        match &self.device_lost {
            Some(reason) => Err(GpuError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn complete_through(&mut self, frame: FrameId) {
        while self.gpu_queue.front().is_some_and(|&f| f <= frame) {
            let done = self.gpu_queue.pop_front();
            self.completed = done.max(self.completed);
        }
    }

    fn complete_all(&mut self) {
        if let Some(&last) = self.gpu_queue.back() {
            self.complete_through(last);
        }
    }

    fn rasterize(&self, pass: &FramePass<'_, HeadlessDepth>) -> PresentedImage {
        let color = if self.format.is_srgb() {
            encode_srgb(pass.clear_color)
        } else {
            pass.clear_color
        };
        PresentedImage {
            frame_id: pass.frame_id,
            size: pass.size,
            format: self.format,
            pixels: vec![color.to_rgba8(); pass.size.pixel_count()],
            clear_color: pass.clear_color,
            content_offset: pass.content_offset,
            depth_size: pass.depth.map(HeadlessDepth::size),
        }
    }
}

/// Linear to sRGB transfer, alpha untouched.
fn encode_srgb(c: ClearColor) -> ClearColor {
    fn channel(v: f64) -> f64 {
        let v = v.clamp(0.0, 1.0);
        if v <= 0.0031308 {
            v * 12.92
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    }
    ClearColor::rgba(channel(c.r), channel(c.g), channel(c.b), c.a)
}

impl DrawableProvider for HeadlessBackend {
    type Drawable = HeadlessDrawable;
    type DepthTarget = HeadlessDepth;

    fn device_info(&self) -> Result<DeviceInfo, GpuError> {
        let inner = self.inner();
        if inner.faults.no_device {
            return Err(GpuError::Other("no adapter available".into()));
        }
        inner.check_device()?;
        Ok(DeviceInfo {
            name: "Headless CPU".into(),
            backend: "headless".into(),
        })
    }

    fn drawable_size(&self) -> SurfaceSize {
        self.inner().drawable_size
    }

    fn pixel_format(&self) -> PixelFormat {
        self.inner().format
    }

    fn configure(&mut self, size: SurfaceSize) -> Result<(), GpuError> {
        let mut inner = self.inner();
        inner.check_device()?;
        inner.configured = Some(size);
        inner.configure_calls += 1;
        Ok(())
    }

    fn create_depth_target(&mut self, size: SurfaceSize) -> Result<HeadlessDepth, GpuError> {
        let mut inner = self.inner();
        inner.check_device()?;
        if inner.faults.depth_failures > 0 {
            inner.faults.depth_failures -= 1;
            return Err(GpuError::OutOfMemory(format!("depth target {}", size)));
        }
        inner.depth_created += 1;
        self.live_depth.fetch_add(1, Ordering::AcqRel);
        Ok(HeadlessDepth {
            size,
            live: self.live_depth.clone(),
        })
    }

    fn acquire_drawable(&mut self, _timeout: Duration) -> Result<HeadlessDrawable, GpuError> {
        let mut inner = self.inner();
        inner.check_device()?;
        if inner.faults.acquire_timeouts > 0 {
            inner.faults.acquire_timeouts -= 1;
            return Err(GpuError::Timeout);
        }
        if inner.faults.outdated_acquires > 0 {
            inner.faults.outdated_acquires -= 1;
            return Err(GpuError::Outdated);
        }
        if inner.drawables_out >= inner.swapchain_images {
            return Err(GpuError::Timeout);
        }
        let Some(size) = inner.configured else {
            return Err(GpuError::Other("surface not configured".into()));
        };

        inner.drawables_out += 1;
        inner.next_drawable += 1;
        Ok(HeadlessDrawable {
            id: inner.next_drawable,
            size,
            shared: self.shared.clone(),
        })
    }

    fn submit(
        &mut self,
        drawable: &HeadlessDrawable,
        pass: &FramePass<'_, HeadlessDepth>,
    ) -> Result<(), GpuError> {
        let mut inner = self.inner();
        inner.check_device()?;

        if let Some(depth) = pass.depth.filter(|d| d.size() != pass.size) {
            return Err(GpuError::Other(format!(
                "depth target {} does not match pass {}",
                depth.size(),
                pass.size
            )));
        }

        // Encoded into the drawable; it stays rendered until presented or
        // dropped, even if the submission itself fails.
        let image = inner.rasterize(pass);
        inner.rendered.insert(drawable.id, image);

        if let Some(reason) = inner.faults.lose_device_on_submit.take() {
            inner.device_lost = Some(reason.clone());
            return Err(GpuError::DeviceLost(reason));
        }

        push_bounded(&mut inner.submissions, pass.frame_id, RETAINED_RECORDS);
        inner.gpu_queue.push_back(pass.frame_id);
        if !inner.manual_completion {
            inner.complete_all();
        }
        Ok(())
    }

    fn present(&mut self, drawable: HeadlessDrawable) {
        {
            let mut inner = self.inner();
            match inner.rendered.remove(&drawable.id) {
                Some(image) => {
                    let record = PresentRecord {
                        frame_id: image.frame_id,
                        size: image.size,
                        clear_color: image.clear_color,
                        content_offset: image.content_offset,
                    };
                    push_bounded(&mut inner.records, record, RETAINED_RECORDS);
                    push_bounded(&mut inner.images, image, RETAINED_IMAGES);
                }
                None => tracing::warn!("Presenting a drawable that was never rendered"),
            }
        }
        // Lock released; dropping returns the image to the pool.
        drop(drawable);
    }

    fn poll_completed(&mut self) -> Result<Option<FrameId>, GpuError> {
        let inner = self.inner();
        inner.check_device()?;
        Ok(inner.completed)
    }

    fn wait_for_frame(&mut self, frame: FrameId, _timeout: Duration) -> Result<bool, GpuError> {
        let inner = self.inner();
        inner.check_device()?;
        Ok(inner.completed.is_some_and(|done| done >= frame))
    }
}
