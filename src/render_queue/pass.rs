//! Render passes: the declared output contract plus the behaviour that feeds the renderer.

use super::resources::{DataStore, ResourceCache};
use crate::camera::Camera;
use crate::error::ValidationError;
use crate::renderer::{Renderer, Viewport};
use crate::texture::{TextureConfig, TextureRef};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Shared handle to a [`RenderPass`]. The queue and its snapshots hold clones of
/// the handle; identity is pointer identity.
pub type PassRef<R> = Rc<RefCell<RenderPass<R>>>;

/// Shared handle to a merge material.
pub type MaterialRef<M> = Rc<RefCell<M>>;

/// What a pass renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Renders a scene supplied by the pass.
    Direct,
    /// Composites textures through a full-screen material.
    Merge,
}

/// Where a pass renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    Screen,
    OffscreenTexture,
}

/// A requested color output: the cache id it is bound to and how to configure it.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorOutput {
    pub id: String,
    pub config: TextureConfig,
}

impl ColorOutput {
    pub fn new(id: impl Into<String>, config: TextureConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }
}

/// The declarative half of a pass.
///
/// Kind and destination are fixed at construction; the viewport may change
/// between runs.
#[derive(Clone, Debug, PartialEq)]
pub struct PassDescriptor {
    kind: PassKind,
    destination: Destination,
    viewport: Viewport,
    color_outputs: Vec<ColorOutput>,
    depth_output: Option<String>,
}

impl PassDescriptor {
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn color_outputs(&self) -> &[ColorOutput] {
        &self.color_outputs
    }

    pub fn depth_output(&self) -> Option<&str> {
        self.depth_output.as_deref()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.viewport.is_empty() {
            return Err(ValidationError::EmptyViewport {
                width: self.viewport.width,
                height: self.viewport.height,
            });
        }

        if self.destination == Destination::Screen
            && (!self.color_outputs.is_empty() || self.depth_output.is_some())
        {
            log::warn!("[render-queue] Screen pass declares texture outputs, they will be ignored");
        }

        let mut seen = HashSet::new();
        for output in &self.color_outputs {
            if !seen.insert(output.id.as_str()) {
                return Err(ValidationError::DuplicateOutput(output.id.clone()));
            }
        }

        match &self.depth_output {
            Some(depth) if seen.contains(depth.as_str()) => {
                Err(ValidationError::DepthAliasesColor(depth.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Result of a pass's preprocessing step for one run.
pub enum PassOutput<'a, R: Renderer> {
    /// Draw `scene` through `camera`. Valid for [`PassKind::Direct`].
    Scene {
        scene: &'a R::Scene,
        camera: &'a Camera,
    },
    /// Bind `inputs` to `material` and draw the compositor quad. Valid for [`PassKind::Merge`].
    Merge {
        material: MaterialRef<R::Material>,
        inputs: Vec<TextureRef>,
    },
    /// Contribute nothing this run.
    Skip,
}

/// The behavioural half of a pass.
///
/// Closures of the form `FnMut(&mut ResourceCache, &mut DataStore) -> PassOutput<'static, R>`
/// implement this trait, which is convenient for merge passes and passes that
/// only seed data.
pub trait PassLogic<R: Renderer> {
    /// Called once, before the first preprocessing of this pass.
    fn initialize(&mut self, _resources: &mut ResourceCache, _data: &mut DataStore) {}

    /// Called on every run.
    fn preprocess<'a>(&'a mut self, resources: &mut ResourceCache, data: &mut DataStore) -> PassOutput<'a, R>;
}

impl<R, F> PassLogic<R> for F
where
    R: Renderer,
    R::Scene: 'static,
    F: FnMut(&mut ResourceCache, &mut DataStore) -> PassOutput<'static, R>,
{
    fn preprocess<'a>(&'a mut self, resources: &mut ResourceCache, data: &mut DataStore) -> PassOutput<'a, R> {
        self(resources, data)
    }
}

/// One step of a render queue.
///
/// # Example
///
/// ```ignore
/// let gbuffer = RenderPass::direct(Destination::OffscreenTexture, Viewport::new(512, 512), GBufferLogic::new())
///     .with_color_output("albedo", TextureConfig::new())
///     .with_depth_output("depth")
///     .into_ref();
/// ```
pub struct RenderPass<R: Renderer> {
    descriptor: PassDescriptor,
    logic: Box<dyn PassLogic<R>>,
    initialized: bool,
}

impl<R: Renderer> RenderPass<R> {
    pub fn new(
        kind: PassKind,
        destination: Destination,
        viewport: Viewport,
        logic: impl PassLogic<R> + 'static,
    ) -> Self {
        Self {
            descriptor: PassDescriptor {
                kind,
                destination,
                viewport,
                color_outputs: Vec::new(),
                depth_output: None,
            },
            logic: Box::new(logic),
            initialized: false,
        }
    }

    /// A pass that renders its own scene.
    pub fn direct(destination: Destination, viewport: Viewport, logic: impl PassLogic<R> + 'static) -> Self {
        Self::new(PassKind::Direct, destination, viewport, logic)
    }

    /// A pass that composites textures through the merge compositor.
    pub fn merge(destination: Destination, viewport: Viewport, logic: impl PassLogic<R> + 'static) -> Self {
        Self::new(PassKind::Merge, destination, viewport, logic)
    }

    /// Request a color output bound to `id`. Outputs attach in the order they are added.
    pub fn with_color_output(mut self, id: impl Into<String>, config: TextureConfig) -> Self {
        self.descriptor.color_outputs.push(ColorOutput::new(id, config));
        self
    }

    /// Request a depth output bound to `id`.
    pub fn with_depth_output(mut self, id: impl Into<String>) -> Self {
        self.descriptor.depth_output = Some(id.into());
        self
    }

    pub fn into_ref(self) -> PassRef<R> {
        Rc::new(RefCell::new(self))
    }

    pub fn descriptor(&self) -> &PassDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> PassKind {
        self.descriptor.kind
    }

    pub fn destination(&self) -> Destination {
        self.descriptor.destination
    }

    pub fn viewport(&self) -> Viewport {
        self.descriptor.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.descriptor.viewport = viewport;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        self.descriptor.validate()
    }

    /// Run one-time initialization if it has not happened yet, then preprocess.
    ///
    /// Returns the descriptor alongside the output so callers can read the
    /// contract while the output borrows the logic.
    pub(crate) fn prepare(
        &mut self,
        resources: &mut ResourceCache,
        data: &mut DataStore,
    ) -> (&PassDescriptor, PassOutput<'_, R>) {
        let Self {
            descriptor,
            logic,
            initialized,
        } = self;

        if !*initialized {
            logic.initialize(resources, data);
            *initialized = true;
        }

        (descriptor, logic.preprocess(resources, data))
    }
}

impl<R: Renderer> std::fmt::Debug for RenderPass<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("descriptor", &self.descriptor)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}
