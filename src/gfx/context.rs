//! Explicit GPU context
//!
//! Owns the device, queue and (for windowed hosts) the configured surface.
//! Constructed once by the host and passed by reference to everything that
//! creates GPU resources.

use crate::error::{SimError, SimResult};

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

pub struct GpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<SurfaceState>,
}

impl GpuContext {
    /// Creates a context presenting to `window`
    ///
    /// # Arguments
    /// * `window` - Window surface target for rendering
    /// * `width` - Initial surface width in pixels
    /// * `height` - Initial surface height in pixels
    ///
    /// # Errors
    /// `SimError::Adapter` when no compatible adapter or device is found,
    /// `SimError::Surface` when the window cannot back a surface.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> SimResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| SimError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SimError::Adapter(e.to_string()))?;
        let (device, queue) = Self::request_device(&adapter).await?;

        let capabilities = surface.get_capabilities(&adapter);
        let Some(&first) = capabilities.formats.first() else {
            return Err(SimError::Surface("surface reports no formats".into()));
        };
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(first);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "GPU context: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.width,
            config.height,
            format
        );

        Ok(Self {
            adapter,
            device,
            queue,
            surface: Some(SurfaceState { surface, config }),
        })
    }

    /// Creates a context without a surface, for offscreen use and tests
    pub async fn headless() -> SimResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| SimError::Adapter(e.to_string()))?;
        let (device, queue) = Self::request_device(&adapter).await?;
        log::info!("GPU context: headless on {}", adapter.get_info().name);
        Ok(Self {
            adapter,
            device,
            queue,
            surface: None,
        })
    }

    async fn request_device(adapter: &wgpu::Adapter) -> SimResult<(wgpu::Device, wgpu::Queue)> {
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("flowveil device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: crate::config::MAX_FIELD_DIMENSION,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| SimError::Adapter(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("wgpu: uncaptured error: {}", error);
        }));
        Ok((device, queue))
    }

    /// Whether `format` can be rendered into and bound as a texture
    pub fn supports_render_target(&self, format: wgpu::TextureFormat) -> bool {
        let usages = self
            .adapter
            .get_texture_format_features(format)
            .allowed_usages;
        usages.contains(
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        )
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Surface format, or `None` for a headless context
    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.surface.as_ref().map(|s| s.config.format)
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface
            .as_ref()
            .map(|s| (s.config.width, s.config.height))
    }

    /// Reconfigures the surface; zero sizes (minimised windows) are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = self.surface.as_mut() {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }

    /// Next surface texture to render into
    ///
    /// A lost or outdated surface is reconfigured and acquired once more.
    pub fn acquire_frame(&mut self) -> SimResult<wgpu::SurfaceTexture> {
        let Some(state) = self.surface.as_mut() else {
            return Err(SimError::Surface("headless context has no surface".into()));
        };
        match state.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("GPU context: surface lost, reconfiguring");
                state.surface.configure(&self.device, &state.config);
                state
                    .surface
                    .get_current_texture()
                    .map_err(|e| SimError::Surface(e.to_string()))
            }
            Err(e) => Err(SimError::Surface(e.to_string())),
        }
    }
}
