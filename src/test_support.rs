//! Recording doubles for driving a render queue without a GPU.

use crate::camera::Camera;
use crate::render_queue::{DataStore, MergeMaterial, PassLogic, PassOutput, RenderTarget, ResourceCache};
use crate::renderer::{Renderer, SceneRef, Viewport};
use crate::texture::TextureRef;

/// A named scene; the name is what the renderer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestScene {
    pub name: String,
}

impl TestScene {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

#[derive(Debug, Default)]
pub struct RecordingMaterial {
    maps: Vec<TextureRef>,
}

impl MergeMaterial for RecordingMaterial {
    fn clear_maps(&mut self) {
        self.maps.clear();
    }

    fn add_map(&mut self, texture: TextureRef) {
        self.maps.push(texture);
    }

    fn maps(&self) -> &[TextureRef] {
        &self.maps
    }
}

/// Shape of the render target at the time of a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendered {
    pub width: u32,
    pub height: u32,
    pub colors: usize,
    pub depth: bool,
}

impl Rendered {
    pub fn target(width: u32, height: u32, colors: usize, depth: bool) -> Self {
        Self {
            width,
            height,
            colors,
            depth,
        }
    }
}

/// One recorded render call. Composite draws are recorded as `"<composite>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub scene: String,
    pub target: Option<Rendered>,
    pub viewport: Viewport,
}

#[derive(Debug)]
pub struct RecordingRenderer {
    pub viewport: Viewport,
    pub calls: Vec<Call>,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: Viewport::new(width, height),
            calls: Vec::new(),
        }
    }
}

impl Renderer for RecordingRenderer {
    type Scene = TestScene;
    type Material = RecordingMaterial;

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn render(&mut self, scene: SceneRef<'_, Self>, _camera: &Camera, target: Option<&RenderTarget>) {
        let scene = match scene {
            SceneRef::Scene(scene) => scene.name.clone(),
            SceneRef::Composite(_) => "<composite>".to_owned(),
        };
        let target = target.map(|target| Rendered {
            width: target.width(),
            height: target.height(),
            colors: target.color_attachments().len(),
            depth: target.depth_attachment().is_some(),
        });
        self.calls.push(Call {
            scene,
            target,
            viewport: self.viewport,
        });
    }
}

/// Pass logic that always skips.
pub struct SkipLogic;

impl<R: Renderer> PassLogic<R> for SkipLogic {
    fn preprocess<'a>(&'a mut self, _resources: &mut ResourceCache, _data: &mut DataStore) -> PassOutput<'a, R> {
        PassOutput::Skip
    }
}

pub fn skip() -> SkipLogic {
    SkipLogic
}
