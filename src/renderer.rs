//! The renderer contract the render queue drives.

use crate::camera::Camera;
use crate::render_queue::{MergeCompositor, MergeMaterial, RenderTarget};

/// Output size of a render pass or of the renderer itself, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// What a single render call draws.
pub enum SceneRef<'a, R: Renderer + ?Sized> {
    /// A scene supplied by a direct pass.
    Scene(&'a R::Scene),
    /// The merge compositor's full-screen quad with its currently assigned material.
    Composite(&'a MergeCompositor<R::Material>),
}

/// A synchronous renderer: every `render` call draws immediately.
///
/// The render queue only ever talks to the renderer through this trait, so
/// any backend (the bundled [`GpuRenderer`](crate::GpuRenderer), or a recording
/// double in tests) can execute a queue.
pub trait Renderer {
    /// Scene type handed out by direct passes.
    type Scene: ?Sized;
    /// Material type handed out by merge passes.
    type Material: MergeMaterial;

    /// Current output viewport.
    fn viewport(&self) -> Viewport;

    /// Change the output viewport used for screen rendering.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Draw `scene` as seen from `camera`, into `target` or to the screen when `None`.
    fn render(&mut self, scene: SceneRef<'_, Self>, camera: &Camera, target: Option<&RenderTarget>);
}
