//! Logical textures shared between the resource cache, the render target and materials.
//!
//! A [`Texture`] describes *what* a texture should be (sampling configuration, format and
//! size). The GPU allocation behind it is created lazily by the renderer and re-created
//! whenever the description changes, so resizing a cached texture keeps its identity:
//! every holder of the same [`TextureRef`] sees the new size.

use crate::gpu::GpuContext;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a [`Texture`]. Identity is pointer identity ([`Rc::ptr_eq`]).
pub type TextureRef = Rc<RefCell<Texture>>;

/// Format used for depth attachments allocated by the render target.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Sampling and storage configuration of a texture.
///
/// `format` covers what GL splits into internal format, format and pixel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureConfig {
    pub wrap_s: wgpu::AddressMode,
    pub wrap_t: wgpu::AddressMode,
    pub min_filter: wgpu::FilterMode,
    pub mag_filter: wgpu::FilterMode,
    pub format: wgpu::TextureFormat,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            wrap_s: wgpu::AddressMode::ClampToEdge,
            wrap_t: wgpu::AddressMode::ClampToEdge,
            min_filter: wgpu::FilterMode::Linear,
            mag_filter: wgpu::FilterMode::Linear,
            format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl TextureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration used for depth attachments.
    pub fn depth() -> Self {
        Self {
            min_filter: wgpu::FilterMode::Nearest,
            mag_filter: wgpu::FilterMode::Nearest,
            format: DEPTH_FORMAT,
            ..Self::default()
        }
    }

    pub fn with_wrap(mut self, wrap_s: wgpu::AddressMode, wrap_t: wgpu::AddressMode) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    pub fn with_filter(mut self, min_filter: wgpu::FilterMode, mag_filter: wgpu::FilterMode) -> Self {
        self.min_filter = min_filter;
        self.mag_filter = mag_filter;
        self
    }

    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn is_depth(&self) -> bool {
        self.format.is_depth_stencil_format()
    }
}

/// A GPU realisation of a [`Texture`].
#[derive(Debug)]
pub struct GpuTexture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    config: TextureConfig,
}

impl GpuTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A logical texture: configuration, size and optional initial pixel data.
#[derive(Debug)]
pub struct Texture {
    config: TextureConfig,
    width: u32,
    height: u32,
    /// Tightly packed RGBA8 rows uploaded on first realisation.
    pixels: Option<Vec<u8>>,
    gpu: Option<GpuTexture>,
}

impl Texture {
    /// Create a texture from a configuration at the given size.
    pub fn new(config: TextureConfig, width: u32, height: u32) -> Self {
        Self {
            config,
            width,
            height,
            pixels: None,
            gpu: None,
        }
    }

    /// Create a depth texture at the given size.
    pub fn depth(width: u32, height: u32) -> Self {
        Self::new(TextureConfig::depth(), width, height)
    }

    /// Create a texture from raw RGBA data.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Self {
        let config = TextureConfig::default()
            .with_wrap(wgpu::AddressMode::Repeat, wgpu::AddressMode::Repeat)
            .with_format(wgpu::TextureFormat::Rgba8UnormSrgb);
        Self {
            pixels: Some(data),
            ..Self::new(config, width, height)
        }
    }

    /// Create a texture from a decoded image, e.g. one delivered by the
    /// [`ImageLoader`](crate::ImageLoader).
    pub fn from_image(image: &image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_rgba(image.as_raw().clone(), width, height)
    }

    /// Wrap this texture in a shared handle.
    pub fn into_ref(self) -> TextureRef {
        Rc::new(RefCell::new(self))
    }

    pub fn config(&self) -> &TextureConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Replace the sampling and storage configuration, keeping the size.
    pub fn apply_config(&mut self, config: &TextureConfig) {
        if self.config != *config {
            self.config = *config;
            // Initial pixels are RGBA8 and only valid for the format they were created with.
            self.pixels = None;
        }
    }

    /// Resize in place. The GPU allocation is re-created on next use.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if self.size() != (width, height) {
            self.width = width;
            self.height = height;
            self.pixels = None;
        }
    }

    /// The current GPU realisation, if it matches the description.
    pub fn gpu(&self) -> Option<&GpuTexture> {
        self.gpu.as_ref().filter(|gpu| self.is_realized_by(gpu))
    }

    fn is_realized_by(&self, gpu: &GpuTexture) -> bool {
        gpu.width == self.width && gpu.height == self.height && gpu.config == self.config
    }

    /// Make sure a GPU allocation matching the current description exists.
    pub(crate) fn realize(&mut self, gpu: &GpuContext) -> &GpuTexture {
        let allocation = match self.gpu.take() {
            Some(existing) if self.is_realized_by(&existing) => existing,
            _ => {
                log::trace!(
                    "[texture] Allocating {}x{} {:?}",
                    self.width,
                    self.height,
                    self.config.format
                );
                self.allocate(gpu)
            }
        };
        self.gpu.insert(allocation)
    }

    fn allocate(&self, gpu: &GpuContext) -> GpuTexture {
        use wgpu::util::DeviceExt;

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if self.pixels.is_some() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }

        let descriptor = wgpu::TextureDescriptor {
            label: Some("Render Queue Texture"),
            size: wgpu::Extent3d {
                width: self.width.max(1),
                height: self.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage,
            view_formats: &[],
        };

        let texture = match &self.pixels {
            Some(data) => gpu.device.create_texture_with_data(
                &gpu.queue,
                &descriptor,
                wgpu::util::TextureDataOrder::LayerMajor,
                data,
            ),
            None => gpu.device.create_texture(&descriptor),
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Depth and 32-bit float formats can only be sampled without filtering.
        let (min_filter, mag_filter) = if self.is_filterable() {
            (self.config.min_filter, self.config.mag_filter)
        } else {
            (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest)
        };
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Render Queue Texture Sampler"),
            address_mode_u: self.config.wrap_s,
            address_mode_v: self.config.wrap_t,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter,
            min_filter,
            ..Default::default()
        });

        GpuTexture {
            texture,
            view,
            sampler,
            width: self.width,
            height: self.height,
            config: self.config,
        }
    }

    /// How shaders sample this texture.
    pub(crate) fn sample_type(&self) -> wgpu::TextureSampleType {
        self.config
            .format
            .sample_type(None, None)
            .unwrap_or(wgpu::TextureSampleType::Float { filterable: false })
    }

    pub(crate) fn is_filterable(&self) -> bool {
        matches!(self.sample_type(), wgpu::TextureSampleType::Float { filterable: true })
    }
}
