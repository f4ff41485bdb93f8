//! Multi-pass rendering driven by an ordered queue of passes.
//!
//! A [`RenderQueue`] runs its [`RenderPass`]es in order against a
//! [`Renderer`](crate::Renderer). Passes either draw a scene of their own
//! ([`PassKind::Direct`]) or composite earlier outputs through the
//! [`MergeCompositor`] ([`PassKind::Merge`]), and render to the screen or to the
//! queue's shared [`RenderTarget`].
//!
//! Texture outputs are cached by id in the [`ResourceCache`] for the lifetime of
//! the queue; arbitrary values travel between passes through the [`DataStore`].

mod compositor;
mod pass;
mod queue;
mod render_target;
mod resources;

pub use compositor::{MergeCompositor, MergeMaterial, Quad};
pub use pass::{
    ColorOutput, Destination, MaterialRef, PassDescriptor, PassKind, PassLogic, PassOutput,
    PassRef, RenderPass,
};
pub use queue::{Aborted, RenderQueue, RenderQueueConfig, RunOutput};
pub use render_target::RenderTarget;
pub use resources::{DataStore, ResourceCache};
