//! The render queue orchestrator.

use super::compositor::MergeCompositor;
use super::pass::{Destination, PassKind, PassOutput, PassRef};
use super::render_target::RenderTarget;
use super::resources::{DataStore, ResourceCache};
use crate::error::{ExecuteError, QueueError, ValidationError};
use crate::renderer::{Renderer, SceneRef};
use crate::texture::TextureRef;
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// Construction options for a [`RenderQueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderQueueConfig {
    /// Size of the shared render target before the first texture pass resizes it.
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for RenderQueueConfig {
    fn default() -> Self {
        Self {
            target_width: 1920,
            target_height: 1080,
        }
    }
}

impl RenderQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }
}

/// State left behind by a run: every cached texture and every forwarded value.
#[derive(Debug)]
pub struct RunOutput<'a> {
    pub resources: &'a ResourceCache,
    pub data: &'a DataStore,
}

/// A run that stopped early, with the state produced by the passes that did execute.
#[derive(Debug)]
pub struct Aborted<'a> {
    pub error: ExecuteError,
    pub output: RunOutput<'a>,
}

impl std::fmt::Display for Aborted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "render queue aborted: {}", self.error)
    }
}

impl std::error::Error for Aborted<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Executes an ordered list of render passes against a renderer.
///
/// The queue owns everything passes share: the [`ResourceCache`] of textures keyed
/// by output id, the [`DataStore`] of forwarded values, one [`RenderTarget`] that is
/// reconfigured for every texture pass, and the [`MergeCompositor`] used by merge
/// passes. All of it persists across runs.
///
/// Frequently used sequences can be stored under a name with
/// [`store_queue`](Self::store_queue) and restored with [`load_queue`](Self::load_queue).
///
/// # Example
///
/// ```ignore
/// let mut queue = RenderQueue::new();
/// queue.push_pass(gbuffer.clone())?;
/// queue.push_pass(lighting.clone())?;
/// queue.store_queue("deferred");
///
/// // Every frame:
/// match queue.execute(&mut renderer) {
///     Ok(output) => present(output.resources.get("color")),
///     Err(aborted) => log::warn!("{aborted}"),
/// }
/// ```
pub struct RenderQueue<R: Renderer> {
    queue: Vec<PassRef<R>>,
    snapshots: HashMap<String, Vec<PassRef<R>>>,
    resources: ResourceCache,
    data: DataStore,
    target: RenderTarget,
    compositor: MergeCompositor<R::Material>,
}

impl<R: Renderer> Default for RenderQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Renderer> RenderQueue<R> {
    pub fn new() -> Self {
        Self::with_config(RenderQueueConfig::default())
    }

    pub fn with_config(config: RenderQueueConfig) -> Self {
        Self {
            queue: Vec::new(),
            snapshots: HashMap::new(),
            resources: ResourceCache::new(),
            data: DataStore::new(),
            target: RenderTarget::new(config.target_width, config.target_height),
            compositor: MergeCompositor::new(),
        }
    }

    // ========================================================================
    // Queue construction
    // ========================================================================

    /// Replace the active queue. Nothing changes if any pass is invalid.
    pub fn set_queue(&mut self, passes: Vec<PassRef<R>>) -> Result<(), QueueError> {
        for (position, pass) in passes.iter().enumerate() {
            validate(position, pass)?;
        }
        self.queue = passes;
        Ok(())
    }

    /// Remove every pass from the active queue.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Append a pass to the end of the queue.
    pub fn push_pass(&mut self, pass: PassRef<R>) -> Result<(), QueueError> {
        validate(0, &pass)?;
        self.queue.push(pass);
        Ok(())
    }

    /// Insert a pass at `index`, shifting later passes back.
    pub fn insert_pass(&mut self, pass: PassRef<R>, index: usize) -> Result<(), QueueError> {
        if index > self.queue.len() {
            let reason = ValidationError::IndexOutOfBounds {
                index,
                len: self.queue.len(),
            };
            log::error!("[render-queue] Cannot insert pass: {}", reason);
            return Err(QueueError::Validation { position: 0, reason });
        }
        validate(0, &pass)?;
        self.queue.insert(index, pass);
        Ok(())
    }

    /// Remove the first occurrence of `pass`. Returns `false` if it was not queued.
    pub fn remove_pass(&mut self, pass: &PassRef<R>) -> bool {
        match self.queue.iter().position(|queued| Rc::ptr_eq(queued, pass)) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove and return the last pass.
    pub fn pop_pass(&mut self) -> Option<PassRef<R>> {
        self.queue.pop()
    }

    // ========================================================================
    // Queue management
    // ========================================================================

    /// Snapshot the active queue under `name`, replacing any earlier snapshot.
    ///
    /// The snapshot keeps its own list, so later edits to the active queue do not
    /// reach it. The passes themselves are shared, not copied.
    pub fn store_queue(&mut self, name: impl Into<String>) {
        self.snapshots.insert(name.into(), self.queue.clone());
    }

    /// Make the snapshot stored under `name` the active queue.
    pub fn load_queue(&mut self, name: &str) -> Result<(), QueueError> {
        match self.snapshots.get(name) {
            Some(snapshot) => {
                self.queue = snapshot.clone();
                Ok(())
            }
            None => {
                log::error!("[render-queue] Could not find the stored queue '{}'", name);
                Err(QueueError::MissingSnapshot(name.to_owned()))
            }
        }
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        self.snapshots.contains_key(name)
    }

    // ========================================================================
    // Shared state
    // ========================================================================

    /// Bind an externally supplied texture to `id` before a run.
    pub fn seed_resource(&mut self, id: impl Into<String>, texture: TextureRef) {
        self.resources.insert(id, texture);
    }

    /// Store a value for passes to read.
    pub fn seed_data<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key, value);
    }

    pub fn passes(&self) -> &[PassRef<R>] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn compositor(&self) -> &MergeCompositor<R::Material> {
        &self.compositor
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run every queued pass in order.
    ///
    /// The renderer's viewport is restored before returning, whether the run
    /// completed or not. On abort, the returned [`Aborted`] still carries the
    /// cache and data store as left by the passes that ran.
    pub fn execute(&mut self, renderer: &mut R) -> Result<RunOutput<'_>, Aborted<'_>> {
        let cleanup_viewport = renderer.viewport();
        let result = self.run_passes(renderer);
        renderer.set_viewport(cleanup_viewport);

        let output = RunOutput {
            resources: &self.resources,
            data: &self.data,
        };

        match result {
            Ok(()) => Ok(output),
            Err(error) => {
                log::error!("[render-queue] {}", error);
                Err(Aborted { error, output })
            }
        }
    }

    fn run_passes(&mut self, renderer: &mut R) -> Result<(), ExecuteError> {
        let Self {
            queue,
            resources,
            data,
            target,
            compositor,
            ..
        } = self;

        for (index, handle) in queue.iter().enumerate() {
            let mut pass = handle.borrow_mut();
            let (descriptor, output) = pass.prepare(resources, data);

            let (scene, camera) = match (descriptor.kind(), output) {
                (_, PassOutput::Skip) => {
                    log::trace!("[render-queue] Pass {} skipped", index);
                    continue;
                }
                (PassKind::Direct, PassOutput::Scene { scene, camera }) => (SceneRef::Scene(scene), camera),
                (PassKind::Merge, PassOutput::Merge { material, inputs }) => {
                    compositor.bind(material, inputs);
                    (SceneRef::Composite(&*compositor), compositor.camera())
                }
                (kind, _) => return Err(ExecuteError::InvalidPreprocessOutput { index, kind }),
            };

            log::debug!(
                "[render-queue] Pass {} ({:?} -> {:?}, {}x{})",
                index,
                descriptor.kind(),
                descriptor.destination(),
                descriptor.viewport().width,
                descriptor.viewport().height
            );

            match descriptor.destination() {
                Destination::Screen => {
                    renderer.set_viewport(descriptor.viewport());
                    renderer.render(scene, camera, None);
                }
                Destination::OffscreenTexture => {
                    target.configure(descriptor, resources);
                    renderer.render(scene, camera, Some(&*target));
                }
            }
        }

        Ok(())
    }
}

fn validate<R: Renderer>(position: usize, pass: &PassRef<R>) -> Result<(), QueueError> {
    pass.borrow().validate().map_err(|reason| {
        log::error!("[render-queue] Invalid render pass at position {}: {}", position, reason);
        QueueError::Validation { position, reason }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::render_queue::{MaterialRef, MergeMaterial, PassLogic, RenderPass};
    use crate::renderer::Viewport;
    use crate::test_support::{RecordingMaterial, RecordingRenderer, Rendered, TestScene, skip};
    use crate::texture::{Texture, TextureConfig};
    use std::cell::{Cell, RefCell};

    type Pass = PassRef<RecordingRenderer>;

    /// Direct pass drawing a named scene; counts initializations.
    struct SceneLogic {
        scene: TestScene,
        camera: Camera,
        initialized: Rc<Cell<usize>>,
        skip: Rc<Cell<bool>>,
    }

    impl SceneLogic {
        fn new(name: &str) -> Self {
            Self {
                scene: TestScene::new(name),
                camera: Camera::new(),
                initialized: Rc::new(Cell::new(0)),
                skip: Rc::new(Cell::new(false)),
            }
        }
    }

    impl PassLogic<RecordingRenderer> for SceneLogic {
        fn initialize(&mut self, _resources: &mut ResourceCache, data: &mut DataStore) {
            self.initialized.set(self.initialized.get() + 1);
            data.insert(format!("{}:init", self.scene.name), true);
        }

        fn preprocess<'a>(
            &'a mut self,
            _resources: &mut ResourceCache,
            data: &mut DataStore,
        ) -> PassOutput<'a, RecordingRenderer> {
            if self.skip.get() {
                return PassOutput::Skip;
            }
            *data.get_or_insert_with(&self.scene.name, || 0u32).unwrap() += 1;
            PassOutput::Scene {
                scene: &self.scene,
                camera: &self.camera,
            }
        }
    }

    fn screen(name: &str, width: u32, height: u32) -> Pass {
        RenderPass::direct(Destination::Screen, Viewport::new(width, height), SceneLogic::new(name)).into_ref()
    }

    fn offscreen(name: &str, width: u32, height: u32) -> RenderPass<RecordingRenderer> {
        RenderPass::direct(
            Destination::OffscreenTexture,
            Viewport::new(width, height),
            SceneLogic::new(name),
        )
    }

    fn merge(material: MaterialRef<RecordingMaterial>, inputs: &'static [&'static str]) -> RenderPass<RecordingRenderer> {
        RenderPass::merge(
            Destination::OffscreenTexture,
            Viewport::new(256, 256),
            move |resources: &mut ResourceCache, _: &mut DataStore| -> PassOutput<'static, RecordingRenderer> {
                PassOutput::Merge {
                    material: material.clone(),
                    inputs: inputs
                        .iter()
                        .filter_map(|id| resources.get(id).cloned())
                        .collect(),
                }
            },
        )
    }

    fn invalid() -> Pass {
        RenderPass::direct(Destination::Screen, Viewport::new(0, 600), skip()).into_ref()
    }

    fn names(renderer: &RecordingRenderer) -> Vec<String> {
        renderer.calls.iter().map(|call| call.scene.clone()).collect()
    }

    #[test]
    fn renders_once_per_pass_in_order() {
        let mut queue = RenderQueue::new();
        queue
            .set_queue(vec![screen("a", 10, 10), screen("b", 10, 10), screen("c", 10, 10)])
            .unwrap();
        let mut renderer = RecordingRenderer::new(800, 600);

        assert!(queue.execute(&mut renderer).is_ok());
        assert_eq!(names(&renderer), ["a", "b", "c"]);
    }

    #[test]
    fn end_to_end_offscreen_then_screen() {
        let config = TextureConfig::new().with_format(wgpu::TextureFormat::Rgba16Float);
        let offscreen = offscreen("gbuffer", 512, 512).with_color_output("A", config).into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![offscreen, screen("final", 800, 600)]).unwrap();
        let mut renderer = RecordingRenderer::new(1024, 768);

        let output = queue.execute(&mut renderer).unwrap();

        assert_eq!(renderer.calls.len(), 2);
        let texture = output.resources.get("A").unwrap().borrow();
        assert_eq!(texture.size(), (512, 512));
        assert_eq!(texture.config().format, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(renderer.calls[0].target, Some(Rendered::target(512, 512, 1, false)));
        assert_eq!(renderer.calls[1].target, None);
        assert_eq!(renderer.calls[1].viewport, Viewport::new(800, 600));
        assert_eq!(renderer.viewport, Viewport::new(1024, 768));
    }

    #[test]
    fn color_output_is_resized_not_reallocated() {
        let first = offscreen("first", 256, 256).with_color_output("shared", TextureConfig::new()).into_ref();
        let second = offscreen("second", 64, 32).with_color_output("shared", TextureConfig::new()).into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![first.clone()]).unwrap();
        let mut renderer = RecordingRenderer::new(800, 600);

        queue.execute(&mut renderer).unwrap();
        let bound = queue.resources().get("shared").unwrap().clone();

        queue.set_queue(vec![first, second]).unwrap();
        queue.execute(&mut renderer).unwrap();

        assert!(Rc::ptr_eq(&bound, queue.resources().get("shared").unwrap()));
        assert_eq!(bound.borrow().size(), (64, 32));
        assert_eq!(queue.resources().len(), 1);
    }

    #[test]
    fn depth_output_is_allocated_once() {
        let first = offscreen("first", 128, 128).with_depth_output("depth").into_ref();
        let second = offscreen("second", 512, 256).with_depth_output("depth").into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![first]).unwrap();
        let mut renderer = RecordingRenderer::new(800, 600);

        queue.execute(&mut renderer).unwrap();
        let depth = queue.resources().get("depth").unwrap().clone();
        assert_eq!(depth.borrow().size(), (128, 128));

        queue.push_pass(second).unwrap();
        queue.execute(&mut renderer).unwrap();

        assert!(Rc::ptr_eq(&depth, queue.resources().get("depth").unwrap()));
        assert!(Rc::ptr_eq(&depth, queue.render_target().depth_attachment().unwrap()));
        assert_eq!(depth.borrow().size(), (512, 256));
    }

    #[test]
    fn push_then_pop_returns_same_pass() {
        let mut queue = RenderQueue::new();
        queue.push_pass(screen("a", 10, 10)).unwrap();
        let pass = screen("b", 10, 10);

        queue.push_pass(pass.clone()).unwrap();
        let popped = queue.pop_pass().unwrap();

        assert!(Rc::ptr_eq(&popped, &pass));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_on_empty_queue_returns_none() {
        let mut queue = RenderQueue::<RecordingRenderer>::new();
        assert!(queue.pop_pass().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_absent_pass_is_a_no_op() {
        let mut queue = RenderQueue::new();
        let kept = screen("a", 10, 10);
        queue.push_pass(kept.clone()).unwrap();

        assert!(!queue.remove_pass(&screen("a", 10, 10)));
        assert_eq!(queue.len(), 1);
        assert!(Rc::ptr_eq(&queue.passes()[0], &kept));
    }

    #[test]
    fn remove_takes_first_occurrence_only() {
        let mut queue = RenderQueue::new();
        let a = screen("a", 10, 10);
        let b = screen("b", 10, 10);
        queue.set_queue(vec![a.clone(), b.clone(), a.clone()]).unwrap();

        assert!(queue.remove_pass(&a));

        assert_eq!(queue.len(), 2);
        assert!(Rc::ptr_eq(&queue.passes()[0], &b));
        assert!(Rc::ptr_eq(&queue.passes()[1], &a));
    }

    #[test]
    fn insert_places_pass_at_index() {
        let mut queue = RenderQueue::new();
        let (a, b, c) = (screen("a", 10, 10), screen("b", 10, 10), screen("c", 10, 10));
        queue.set_queue(vec![a, c]).unwrap();

        queue.insert_pass(b.clone(), 1).unwrap();
        assert!(Rc::ptr_eq(&queue.passes()[1], &b));

        let err = queue.insert_pass(screen("d", 10, 10), 9).unwrap_err();
        assert_eq!(
            err,
            QueueError::Validation {
                position: 0,
                reason: ValidationError::IndexOutOfBounds { index: 9, len: 3 },
            }
        );
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn invalid_pass_is_rejected_without_mutation() {
        let mut queue = RenderQueue::new();
        assert!(queue.push_pass(invalid()).is_err());
        assert!(queue.insert_pass(invalid(), 0).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn set_queue_with_one_invalid_element_keeps_prior_queue() {
        let mut queue = RenderQueue::new();
        let err = queue
            .set_queue(vec![screen("a", 10, 10), invalid()])
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::Validation {
                position: 1,
                reason: ValidationError::EmptyViewport { width: 0, height: 600 },
            }
        ));
        assert!(queue.is_empty());

        let kept = screen("kept", 10, 10);
        queue.set_queue(vec![kept.clone()]).unwrap();
        assert!(queue.set_queue(vec![invalid()]).is_err());
        assert_eq!(queue.len(), 1);
        assert!(Rc::ptr_eq(&queue.passes()[0], &kept));
    }

    #[test]
    fn contract_violations_are_reported() {
        let duplicate = offscreen("dup", 8, 8)
            .with_color_output("x", TextureConfig::new())
            .with_color_output("x", TextureConfig::new())
            .into_ref();
        let aliased = offscreen("alias", 8, 8)
            .with_color_output("x", TextureConfig::new())
            .with_depth_output("x")
            .into_ref();
        let mut queue = RenderQueue::new();

        let reason = |result: Result<(), QueueError>| match result {
            Err(QueueError::Validation { reason, .. }) => reason,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(reason(queue.push_pass(duplicate)), ValidationError::DuplicateOutput("x".into()));
        assert_eq!(reason(queue.push_pass(aliased)), ValidationError::DepthAliasesColor("x".into()));
        assert!(queue.is_empty());
    }

    #[test]
    fn screen_pass_outputs_are_ignored() {
        let pass = RenderPass::direct(Destination::Screen, Viewport::new(8, 8), SceneLogic::new("shown"))
            .with_color_output("x", TextureConfig::new())
            .with_depth_output("depth")
            .into_ref();
        let mut queue = RenderQueue::new();
        queue.push_pass(pass).unwrap();
        let mut renderer = RecordingRenderer::new(100, 100);

        let output = queue.execute(&mut renderer).unwrap();

        assert_eq!(names(&renderer), ["shown"]);
        assert_eq!(renderer.calls[0].target, None);
        assert!(output.resources.is_empty());
    }

    #[test]
    fn pass_without_outputs_does_not_stop_later_passes() {
        let mut queue = RenderQueue::new();
        queue
            .set_queue(vec![offscreen("bare", 32, 16).into_ref(), screen("shown", 10, 10)])
            .unwrap();
        let mut renderer = RecordingRenderer::new(100, 100);

        let output = queue.execute(&mut renderer).unwrap();

        assert_eq!(names(&renderer), ["bare", "shown"]);
        assert_eq!(renderer.calls[0].target, Some(Rendered::target(32, 16, 0, false)));
        assert_eq!(renderer.calls[1].target, None);
        assert!(output.resources.is_empty());
        assert_eq!(renderer.viewport, Viewport::new(100, 100));
    }

    #[test]
    fn stored_queue_is_isolated_from_later_edits() {
        let mut queue = RenderQueue::new();
        let (a, b) = (screen("a", 10, 10), screen("b", 10, 10));
        queue.set_queue(vec![a.clone(), b.clone()]).unwrap();
        queue.store_queue("A");

        queue.pop_pass();
        queue.push_pass(screen("c", 10, 10)).unwrap();
        queue.load_queue("A").unwrap();

        assert_eq!(queue.len(), 2);
        assert!(Rc::ptr_eq(&queue.passes()[0], &a));
        assert!(Rc::ptr_eq(&queue.passes()[1], &b));
    }

    #[test]
    fn store_queue_overwrites_and_shares_passes() {
        let mut queue = RenderQueue::new();
        let a = screen("a", 10, 10);
        queue.set_queue(vec![screen("old", 10, 10)]).unwrap();
        queue.store_queue("main");
        queue.set_queue(vec![a.clone()]).unwrap();
        queue.store_queue("main");

        queue.clear_queue();
        queue.load_queue("main").unwrap();
        assert!(Rc::ptr_eq(&queue.passes()[0], &a));

        // Snapshots share pass instances: a viewport change is visible through both.
        a.borrow_mut().set_viewport(Viewport::new(20, 20));
        let mut renderer = RecordingRenderer::new(100, 100);
        queue.execute(&mut renderer).unwrap();
        assert_eq!(renderer.calls[0].viewport, Viewport::new(20, 20));
    }

    #[test]
    fn loading_missing_snapshot_leaves_queue_unchanged() {
        let mut queue = RenderQueue::new();
        queue.push_pass(screen("a", 10, 10)).unwrap();

        assert_eq!(
            queue.load_queue("nope"),
            Err(QueueError::MissingSnapshot("nope".into()))
        );
        assert_eq!(queue.len(), 1);
        assert!(!queue.has_snapshot("nope"));
    }

    #[test]
    fn skipped_pass_renders_nothing_and_does_not_fail() {
        let logic = SceneLogic::new("skipped");
        let skip_flag = logic.skip.clone();
        skip_flag.set(true);
        let skipped = RenderPass::direct(Destination::OffscreenTexture, Viewport::new(64, 64), logic)
            .with_color_output("never", TextureConfig::new())
            .into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![skipped, screen("shown", 10, 10)]).unwrap();
        let mut renderer = RecordingRenderer::new(100, 100);

        let output = queue.execute(&mut renderer).unwrap();

        assert!(!output.resources.contains("never"));
        assert_eq!(names(&renderer), ["shown"]);
    }

    #[test]
    fn initialization_runs_once_across_runs() {
        let logic = SceneLogic::new("init");
        let count = logic.initialized.clone();
        let pass = RenderPass::direct(Destination::Screen, Viewport::new(10, 10), logic).into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![pass.clone(), pass.clone()]).unwrap();
        let mut renderer = RecordingRenderer::new(100, 100);

        queue.execute(&mut renderer).unwrap();
        let output = queue.execute(&mut renderer).unwrap();

        assert_eq!(count.get(), 1);
        assert!(pass.borrow().is_initialized());
        assert_eq!(output.data.get::<bool>("init:init"), Some(&true));
        // Preprocessing ran on every occurrence of every run.
        assert_eq!(output.data.get::<u32>("init"), Some(&4));
    }

    #[test]
    fn viewport_is_restored_after_success() {
        let mut queue = RenderQueue::new();
        queue
            .set_queue(vec![screen("a", 320, 240), screen("b", 640, 480)])
            .unwrap();
        let mut renderer = RecordingRenderer::new(1280, 720);

        queue.execute(&mut renderer).unwrap();

        assert_eq!(renderer.calls[0].viewport, Viewport::new(320, 240));
        assert_eq!(renderer.calls[1].viewport, Viewport::new(640, 480));
        assert_eq!(renderer.viewport, Viewport::new(1280, 720));
    }

    #[test]
    fn mismatched_output_aborts_with_partial_state() {
        let material = Rc::new(RefCell::new(RecordingMaterial::default()));
        let first = offscreen("first", 64, 64).with_color_output("early", TextureConfig::new()).into_ref();
        // A direct pass that hands back merge inputs.
        let broken = RenderPass::direct(
            Destination::Screen,
            Viewport::new(10, 10),
            move |_: &mut ResourceCache, _: &mut DataStore| -> PassOutput<'static, RecordingRenderer> {
                PassOutput::Merge {
                    material: material.clone(),
                    inputs: Vec::new(),
                }
            },
        )
        .into_ref();
        let mut queue = RenderQueue::new();
        queue
            .set_queue(vec![screen("before", 320, 240), first, broken, screen("after", 10, 10)])
            .unwrap();
        let mut renderer = RecordingRenderer::new(1280, 720);

        let aborted = queue.execute(&mut renderer).unwrap_err();

        assert_eq!(
            aborted.error,
            ExecuteError::InvalidPreprocessOutput {
                index: 2,
                kind: PassKind::Direct,
            }
        );
        assert!(aborted.output.resources.contains("early"));
        assert_eq!(aborted.output.data.get::<u32>("before"), Some(&1));
        assert!(!aborted.output.data.contains_key("after"));
        assert_eq!(names(&renderer), ["before", "first"]);
        assert_eq!(renderer.viewport, Viewport::new(1280, 720));
    }

    #[test]
    fn merge_pass_returning_scene_aborts() {
        let logic = SceneLogic::new("wrong");
        let pass = RenderPass::merge(Destination::Screen, Viewport::new(10, 10), logic).into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![pass]).unwrap();
        let mut renderer = RecordingRenderer::new(100, 100);

        let aborted = queue.execute(&mut renderer).unwrap_err();

        assert_eq!(
            aborted.error,
            ExecuteError::InvalidPreprocessOutput {
                index: 0,
                kind: PassKind::Merge,
            }
        );
        assert!(renderer.calls.is_empty());
        assert_eq!(renderer.viewport, Viewport::new(100, 100));
    }

    #[test]
    fn merge_pass_composites_cached_inputs() {
        let material = Rc::new(RefCell::new(RecordingMaterial::default()));
        let stale = Texture::new(TextureConfig::new(), 1, 1).into_ref();
        material.borrow_mut().add_map(stale);

        let producer = offscreen("producer", 256, 256)
            .with_color_output("color", TextureConfig::new())
            .with_color_output("normal", TextureConfig::new())
            .into_ref();
        let compositor = merge(material.clone(), &["normal", "color", "missing"])
            .with_color_output("merged", TextureConfig::new())
            .into_ref();
        let mut queue = RenderQueue::new();
        queue.set_queue(vec![producer, compositor]).unwrap();
        let mut renderer = RecordingRenderer::new(800, 600);

        let output = queue.execute(&mut renderer).unwrap();

        let maps = material.borrow();
        assert_eq!(maps.maps().len(), 2);
        assert!(Rc::ptr_eq(&maps.maps()[0], output.resources.get("normal").unwrap()));
        assert!(Rc::ptr_eq(&maps.maps()[1], output.resources.get("color").unwrap()));
        assert!(output.resources.contains("merged"));
        assert_eq!(names(&renderer), ["producer", "<composite>"]);
        assert_eq!(renderer.calls[1].target, Some(Rendered::target(256, 256, 1, false)));
        assert!(Rc::ptr_eq(queue.compositor().material().unwrap(), &material));
    }

    #[test]
    fn seeded_state_is_visible_to_passes() {
        let material = Rc::new(RefCell::new(RecordingMaterial::default()));
        let input = Texture::from_rgba(vec![0; 4 * 4 * 4], 4, 4).into_ref();
        let pass = RenderPass::merge(
            Destination::Screen,
            Viewport::new(4, 4),
            move |resources: &mut ResourceCache, data: &mut DataStore| {
                if data.get::<bool>("enabled") != Some(&true) {
                    return PassOutput::<RecordingRenderer>::Skip;
                }
                PassOutput::Merge {
                    material: material.clone(),
                    inputs: resources.get("input").cloned().into_iter().collect(),
                }
            },
        )
        .into_ref();
        let mut queue = RenderQueue::new();
        queue.push_pass(pass).unwrap();
        queue.seed_resource("input", input.clone());
        let mut renderer = RecordingRenderer::new(4, 4);

        queue.execute(&mut renderer).unwrap();
        assert!(renderer.calls.is_empty());

        queue.seed_data("enabled", true);
        queue.execute(&mut renderer).unwrap();
        assert_eq!(names(&renderer), ["<composite>"]);
        assert!(Rc::ptr_eq(&queue.compositor().material().unwrap().borrow().maps()[0], &input));
    }

    #[test]
    fn empty_queue_returns_seeded_state() {
        let mut queue = RenderQueue::<RecordingRenderer>::with_config(RenderQueueConfig::new().target_size(640, 480));
        queue.seed_data("answer", 42i32);
        let mut renderer = RecordingRenderer::new(10, 10);

        let output = queue.execute(&mut renderer).unwrap();

        assert_eq!(output.data.get::<i32>("answer"), Some(&42));
        assert!(output.resources.is_empty());
        assert_eq!(queue.render_target().width(), 640);
        assert!(renderer.calls.is_empty());
    }
}
