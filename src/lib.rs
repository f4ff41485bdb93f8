//! # Multipass
//!
//! **A render queue for multi-pass effects that keeps its textures between passes.**
//!
//! Describe each pass once (what it renders, where to, and which textures it
//! writes) and let the queue wire them together: outputs are cached by id, so a
//! later pass picks up an earlier pass's texture by asking for the same id.
//!
//! ## Quick Start
//!
//! ```ignore
//! use multipass::*;
//!
//! let gbuffer = RenderPass::direct(Destination::OffscreenTexture, Viewport::new(512, 512), scene_logic)
//!     .with_color_output("albedo", TextureConfig::new())
//!     .with_depth_output("depth")
//!     .into_ref();
//!
//! let present = RenderPass::merge(Destination::Screen, Viewport::new(800, 600), move |resources: &mut ResourceCache, _: &mut DataStore| {
//!     PassOutput::Merge {
//!         material: material.clone(),
//!         inputs: resources.get("albedo").cloned().into_iter().collect(),
//!     }
//! })
//! .into_ref();
//!
//! let mut queue = RenderQueue::new();
//! queue.set_queue(vec![gbuffer, present])?;
//! queue.execute(&mut renderer)?;
//! ```
//!
//! ## Concepts
//!
//! - **Passes are shared** - the queue holds handles, so a pass can appear in
//!   several queues and stored snapshots at once.
//! - **One render target** - texture passes reuse a single target whose
//!   attachments are rebuilt per pass from the resource cache.
//! - **Renderer agnostic** - the queue only needs a [`Renderer`]. [`GpuRenderer`]
//!   draws with wgpu; tests drive the same queue with a recording double.

mod camera;
mod error;
mod gpu;
mod gpu_renderer;
mod image_loader;
mod material;
pub mod render_queue;
mod renderer;
mod texture;

#[cfg(test)]
mod test_support;

pub use camera::{Camera, Projection};
pub use error::{ExecuteError, GpuError, ImageError, QueueError, ValidationError};
pub use gpu::GpuContext;
pub use gpu_renderer::{FrameTarget, GpuRenderer, GpuScene};
pub use image_loader::{Decoder, ImageCache, ImageLoader, ImageRef, LoadingManager};
pub use material::{CompositeUniforms, ShaderMaterial};
pub use render_queue::{
    Aborted, ColorOutput, DataStore, Destination, MaterialRef, MergeCompositor, MergeMaterial,
    PassDescriptor, PassKind, PassLogic, PassOutput, PassRef, Quad, RenderPass, RenderQueue,
    RenderQueueConfig, RenderTarget, ResourceCache, RunOutput,
};
pub use renderer::{Renderer, SceneRef, Viewport};
pub use texture::{DEPTH_FORMAT, GpuTexture, Texture, TextureConfig, TextureRef};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
