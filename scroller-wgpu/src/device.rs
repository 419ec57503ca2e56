//! wgpu drawable provider
//!
//! Owns the instance-derived surface, device and queue for one window and
//! implements [`DrawableProvider`] on top of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use winit::window::Window;

use scroller_core::{
    DeviceInfo, DrawableProvider, FrameId, FramePass, GpuError, InitializationError, PixelFormat,
    SurfaceSize,
};

/// Depth attachment format
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Sleep between device polls while waiting on a frame
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Per-frame uniform block, bound at group 0 by any pipeline drawn into the pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// Drawable size in pixels
    pub viewport: [f32; 2],
    pub content_offset: f32,
    pub _pad: f32,
}

impl FrameUniforms {
    pub fn new(size: SurfaceSize, content_offset: f32) -> Self {
        Self {
            viewport: [size.width as f32, size.height as f32],
            content_offset,
            _pad: 0.0,
        }
    }
}

/// Device and surface options.
#[derive(Debug, Clone)]
pub struct WgpuOptions {
    pub vsync: bool,
    /// Passed to the surface as its maximum frame latency
    pub frames_in_flight: u32,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            vsync: true,
            frames_in_flight: 2,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Swapchain image acquired for one frame.
pub struct WgpuDrawable {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Depth texture sized to the drawable.
///
/// The texture must be kept alive alongside its view.
pub struct WgpuDepth {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: SurfaceSize,
}

impl WgpuDepth {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }
}

/// wgpu implementation of [`DrawableProvider`] for a winit window.
pub struct WgpuProvider {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    adapter_info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    uniforms: wgpu::Buffer,
    /// Newest frame id whose submission the queue reported done
    completed: Arc<AtomicU64>,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuProvider {
    /// Create a device and surface for `window`.
    ///
    /// The surface is configured later by the renderer's surface binding.
    pub fn new(window: Arc<Window>, options: &WgpuOptions) -> Result<Self, InitializationError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| InitializationError::NoCompatibleDevice(format!("surface: {}", e)))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| InitializationError::NoCompatibleDevice(e.to_string()))?;

        let adapter_info = adapter.get_info();
        tracing::info!("Using GPU adapter: {:?}", adapter_info.name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Scroller Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| InitializationError::NoCompatibleDevice(e.to_string()))?;

        let lost = Arc::new(Mutex::new(None));
        let lost_flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!("GPU device lost ({:?}): {}", reason, message);
            *lost_flag.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(format!("{:?}: {}", reason, message));
        });

        let caps = surface.get_capabilities(&adapter);
        let format = preferred_format(&caps.formats).ok_or_else(|| {
            InitializationError::NoCompatibleDevice("surface reports no formats".into())
        })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if options.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: options.frames_in_flight.max(1),
        };

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            window,
            surface,
            adapter_info,
            device,
            queue,
            surface_config,
            uniforms,
            completed: Arc::new(AtomicU64::new(0)),
            lost,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Uniform buffer holding the current frame's [`FrameUniforms`]
    pub fn uniform_buffer(&self) -> &wgpu::Buffer {
        &self.uniforms
    }

    fn check_lost(&self) -> Result<(), GpuError> {
        match &*self.lost.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(reason) => Err(GpuError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn poll(&self) -> Result<(), GpuError> {
        self.check_lost()?;
        self.device
            .poll(wgpu::PollType::Poll)
            .map(|_| ())
            .map_err(|e| GpuError::Other(e.to_string()))
    }

    /// Run `f` inside out-of-memory and validation error scopes.
    ///
    /// Errors raised while creating size-dependent resources come back as a
    /// [`GpuError`] instead of reaching the uncaptured-error handler.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(error) => Err(map_device_error(error)),
            None => Ok(value),
        }
    }

    fn completed_frame(&self) -> Option<FrameId> {
        match self.completed.load(Ordering::Acquire) {
            0 => None,
            id => Some(FrameId(id)),
        }
    }
}

/// Prefer an sRGB format the core knows, then any format it knows, then the
/// surface's first choice.
fn preferred_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| f.is_srgb() && pixel_format_of(**f).is_some())
        .or_else(|| formats.iter().find(|f| pixel_format_of(**f).is_some()))
        .or_else(|| formats.first())
        .copied()
}

pub fn pixel_format_of(format: wgpu::TextureFormat) -> Option<PixelFormat> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm => Some(PixelFormat::Bgra8Unorm),
        wgpu::TextureFormat::Bgra8UnormSrgb => Some(PixelFormat::Bgra8UnormSrgb),
        wgpu::TextureFormat::Rgba8Unorm => Some(PixelFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba8UnormSrgb => Some(PixelFormat::Rgba8UnormSrgb),
        wgpu::TextureFormat::Rgba16Float => Some(PixelFormat::Rgba16Float),
        _ => None,
    }
}

/// Reject sizes the device cannot back with a 2D texture.
pub fn check_texture_size(size: SurfaceSize, max_dimension: u32) -> Result<(), GpuError> {
    if size.width > max_dimension || size.height > max_dimension {
        return Err(GpuError::Other(format!(
            "{} exceeds the maximum texture dimension {}",
            size, max_dimension
        )));
    }
    Ok(())
}

pub fn map_device_error(error: wgpu::Error) -> GpuError {
    match error {
        wgpu::Error::OutOfMemory { .. } => GpuError::OutOfMemory(error.to_string()),
        other => GpuError::Other(other.to_string()),
    }
}

/// Map a surface acquisition error to the core's taxonomy.
pub fn map_surface_error(error: wgpu::SurfaceError) -> GpuError {
    match error {
        wgpu::SurfaceError::Timeout => GpuError::Timeout,
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost => GpuError::Outdated,
        wgpu::SurfaceError::OutOfMemory => GpuError::OutOfMemory("surface texture".into()),
        other => GpuError::Other(other.to_string()),
    }
}

impl DrawableProvider for WgpuProvider {
    type Drawable = WgpuDrawable;
    type DepthTarget = WgpuDepth;

    fn device_info(&self) -> Result<DeviceInfo, GpuError> {
        self.check_lost()?;
        Ok(DeviceInfo {
            name: self.adapter_info.name.clone(),
            backend: format!("{:?}", self.adapter_info.backend),
        })
    }

    fn drawable_size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        let format = self.surface_config.format;
        pixel_format_of(format).unwrap_or(if format.is_srgb() {
            PixelFormat::Bgra8UnormSrgb
        } else {
            PixelFormat::Bgra8Unorm
        })
    }

    fn configure(&mut self, size: SurfaceSize) -> Result<(), GpuError> {
        self.check_lost()?;
        check_texture_size(size, self.device.limits().max_texture_dimension_2d)?;

        let mut config = self.surface_config.clone();
        config.width = size.width;
        config.height = size.height;
        self.scoped(|device| self.surface.configure(device, &config))?;
        self.surface_config = config;
        tracing::debug!("Surface configured at {}", size);
        Ok(())
    }

    fn create_depth_target(&mut self, size: SurfaceSize) -> Result<WgpuDepth, GpuError> {
        self.check_lost()?;
        check_texture_size(size, self.device.limits().max_texture_dimension_2d)?;

        let texture = self.scoped(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Depth Buffer"),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuDepth {
            texture,
            view,
            size,
        })
    }

    // wgpu has no per-call acquire timeout; the wait is bounded by the
    // platform's own swapchain timeout, reported as `SurfaceError::Timeout`.
    fn acquire_drawable(&mut self, _timeout: Duration) -> Result<WgpuDrawable, GpuError> {
        self.check_lost()?;
        let texture = self
            .surface
            .get_current_texture()
            .map_err(map_surface_error)?;
        if texture.suboptimal {
            tracing::debug!("Surface texture is suboptimal");
        }
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuDrawable { texture, view })
    }

    fn submit(
        &mut self,
        drawable: &WgpuDrawable,
        pass: &FramePass<'_, WgpuDepth>,
    ) -> Result<(), GpuError> {
        self.check_lost()?;

        let uniforms = FrameUniforms::new(pass.size, pass.content_offset);
        self.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scroller Frame Encoder"),
            });

        let color = pass.clear_color;
        let depth_stencil_attachment =
            pass.depth
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                });

        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &drawable.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color.r,
                            g: color.g,
                            b: color.b,
                            a: color.a,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        let completed = self.completed.clone();
        let frame = pass.frame_id.0;
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(frame, Ordering::AcqRel);
        });

        // A loss detected during submission means this frame never ran.
        self.check_lost()
    }

    fn present(&mut self, drawable: WgpuDrawable) {
        let WgpuDrawable { texture, view } = drawable;
        drop(view);
        self.window.pre_present_notify();
        texture.present();
    }

    fn poll_completed(&mut self) -> Result<Option<FrameId>, GpuError> {
        self.poll()?;
        Ok(self.completed_frame())
    }

    fn wait_for_frame(&mut self, frame: FrameId, timeout: Duration) -> Result<bool, GpuError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll()?;
            if self.completed_frame().is_some_and(|done| done >= frame) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_uniforms_layout() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 16);

        let uniforms = FrameUniforms::new(SurfaceSize::new(800, 600), -12.5);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&uniforms));
        assert_eq!(floats, &[800.0, 600.0, -12.5, 0.0]);
    }

    #[test]
    fn test_surface_error_mapping() {
        assert_eq!(map_surface_error(wgpu::SurfaceError::Timeout), GpuError::Timeout);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Lost), GpuError::Outdated);
        assert_eq!(map_surface_error(wgpu::SurfaceError::Outdated), GpuError::Outdated);
        assert!(matches!(
            map_surface_error(wgpu::SurfaceError::OutOfMemory),
            GpuError::OutOfMemory(_)
        ));
    }

    #[test]
    fn test_oversized_surface_is_rejected_before_allocation() {
        let max = wgpu::Limits::default().max_texture_dimension_2d;

        assert!(check_texture_size(SurfaceSize::new(max, max), max).is_ok());
        assert!(check_texture_size(SurfaceSize::new(800, 600), max).is_ok());

        // Non-fatal: reported as an allocation failure, not device loss
        let err = check_texture_size(SurfaceSize::new(max + 808, 600), max).unwrap_err();
        assert!(matches!(err, GpuError::Other(_)));
        assert!(check_texture_size(SurfaceSize::new(600, max + 1), max).is_err());
    }

    #[test]
    fn test_preferred_format_picks_known_srgb() {
        let formats = [
            wgpu::TextureFormat::Rgb10a2Unorm,
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb,
        ];
        assert_eq!(
            preferred_format(&formats),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            preferred_format(&[wgpu::TextureFormat::Rgb10a2Unorm]),
            Some(wgpu::TextureFormat::Rgb10a2Unorm)
        );
        assert_eq!(preferred_format(&[]), None);
    }

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(
            pixel_format_of(wgpu::TextureFormat::Rgba8UnormSrgb),
            Some(PixelFormat::Rgba8UnormSrgb)
        );
        assert_eq!(pixel_format_of(wgpu::TextureFormat::Depth32Float), None);
    }
}
