//! The wgpu implementation of [`Renderer`].

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::material::ShaderMaterial;
use crate::render_queue::{MergeCompositor, RenderTarget};
use crate::renderer::{Renderer, SceneRef, Viewport};
use crate::texture::TextureRef;

/// Formats and size of the attachments a scene is drawn into.
///
/// Scenes build their pipelines against these formats.
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget<'a> {
    pub color_formats: &'a [wgpu::TextureFormat],
    pub depth_format: Option<wgpu::TextureFormat>,
    pub viewport: Viewport,
}

/// A scene the wgpu renderer can draw.
pub trait GpuScene {
    /// Color the attachments are cleared to before drawing.
    fn clear_color(&self) -> wgpu::Color {
        wgpu::Color::BLACK
    }

    /// Record draw commands into `render_pass`.
    fn draw(&self, gpu: &GpuContext, render_pass: &mut wgpu::RenderPass<'_>, camera: &Camera, target: &FrameTarget<'_>);
}

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    drawn: bool,
}

/// Draws render queue passes with wgpu.
///
/// Screen passes draw into the current surface frame, acquired on the first
/// screen pass and shown with [`present`](Self::present). Later screen passes of
/// the same frame draw over earlier ones. Texture passes realise the render
/// target's attachments on demand and clear them before drawing.
pub struct GpuRenderer {
    gpu: GpuContext,
    viewport: Viewport,
    frame: Option<Frame>,
}

impl GpuRenderer {
    pub fn new(gpu: GpuContext) -> Self {
        let viewport = Viewport::new(gpu.width(), gpu.height());
        Self {
            gpu,
            viewport,
            frame: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Resize the surface and the screen viewport.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.viewport = Viewport::new(self.gpu.width(), self.gpu.height());
    }

    /// Show the frame drawn by this run's screen passes, if any.
    pub fn present(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.surface.present();
        }
    }

    fn acquire_frame(&mut self) -> Option<&mut Frame> {
        if self.frame.is_none() {
            let surface = match self.gpu.surface.get_current_texture() {
                Ok(surface) => surface,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("[gpu-renderer] Surface lost, reconfiguring");
                    self.gpu.reconfigure();
                    return None;
                }
                Err(err) => {
                    log::error!("[gpu-renderer] Could not acquire frame: {}", err);
                    return None;
                }
            };
            let view = surface.texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.frame = Some(Frame {
                surface,
                view,
                drawn: false,
            });
        }
        self.frame.as_mut()
    }

    fn draw_composite(
        &self,
        compositor: &MergeCompositor<ShaderMaterial>,
        render_pass: &mut wgpu::RenderPass<'_>,
        camera: &Camera,
        target: &FrameTarget<'_>,
    ) {
        match compositor.material() {
            Some(material) => {
                material
                    .borrow_mut()
                    .draw(&self.gpu, render_pass, compositor.quad(), camera, target);
            }
            None => log::warn!("[gpu-renderer] Merge quad has no material"),
        }
    }
}

/// Realise `texture` and return a view of it with its format.
fn attachment(gpu: &GpuContext, texture: &TextureRef) -> (wgpu::TextureView, wgpu::TextureFormat) {
    let mut texture = texture.borrow_mut();
    let format = texture.config().format;
    (texture.realize(gpu).view.clone(), format)
}

/// Clip a screen pass viewport to the surface.
fn screen_viewport(requested: Viewport, surface: Viewport) -> Viewport {
    Viewport::new(requested.width.min(surface.width), requested.height.min(surface.height))
}

impl Renderer for GpuRenderer {
    type Scene = dyn GpuScene;
    type Material = ShaderMaterial;

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn render(&mut self, scene: SceneRef<'_, Self>, camera: &Camera, target: Option<&RenderTarget>) {
        let clear_color = match &scene {
            SceneRef::Scene(scene) => scene.clear_color(),
            SceneRef::Composite(_) => wgpu::Color::TRANSPARENT,
        };

        let (color_views, color_formats, depth, viewport, load) = match target {
            Some(target) if !target.has_attachments() => {
                log::warn!("[gpu-renderer] Render target has no attachments, skipping draw");
                return;
            }
            Some(target) => {
                let size = Viewport::new(target.width(), target.height());
                if size.is_empty() {
                    return;
                }
                let (views, formats): (Vec<_>, Vec<_>) = target
                    .color_attachments()
                    .iter()
                    .map(|texture| attachment(&self.gpu, texture))
                    .unzip();
                let depth = target
                    .depth_attachment()
                    .map(|texture| attachment(&self.gpu, texture));
                (views, formats, depth, size, wgpu::LoadOp::Clear(clear_color))
            }
            None => {
                let format = self.gpu.config.format;
                let surface_size = Viewport::new(self.gpu.width(), self.gpu.height());
                let viewport = screen_viewport(self.viewport, surface_size);
                if viewport.is_empty() {
                    return;
                }
                let Some(frame) = self.acquire_frame() else {
                    return;
                };
                let load = if frame.drawn {
                    wgpu::LoadOp::Load
                } else {
                    wgpu::LoadOp::Clear(clear_color)
                };
                (vec![frame.view.clone()], vec![format], None, viewport, load)
            }
        };

        let frame_target = FrameTarget {
            color_formats: &color_formats,
            depth_format: depth.as_ref().map(|(_, format)| *format),
            viewport,
        };

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Queue Encoder"),
            });

        {
            let color_attachments: Vec<_> = color_views
                .iter()
                .map(|view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })
                })
                .collect();

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Queue Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_viewport(0.0, 0.0, viewport.width as f32, viewport.height as f32, 0.0, 1.0);

            match scene {
                SceneRef::Scene(scene) => scene.draw(&self.gpu, &mut render_pass, camera, &frame_target),
                SceneRef::Composite(compositor) => {
                    self.draw_composite(compositor, &mut render_pass, camera, &frame_target)
                }
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        if target.is_none() {
            if let Some(frame) = &mut self.frame {
                frame.drawn = true;
            }
        }
    }
}
