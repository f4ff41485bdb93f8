//! The reusable off-screen destination shared by every texture-output pass.

use super::pass::PassDescriptor;
use super::resources::ResourceCache;
use crate::texture::{Texture, TextureRef};

/// An off-screen render target whose draw buffers are rebuilt for every pass.
///
/// A render queue owns exactly one of these. Before each pass that renders to a
/// texture, [`configure`](Self::configure) detaches whatever the previous pass
/// attached and binds the textures the new pass requested, reusing cached
/// textures by id and allocating the rest.
///
/// Detaching never destroys a texture; cached textures stay alive in the
/// [`ResourceCache`].
#[derive(Debug)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    color: Vec<TextureRef>,
    depth: Option<TextureRef>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: Vec::new(),
            depth: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Color draw buffers in attachment order.
    pub fn color_attachments(&self) -> &[TextureRef] {
        &self.color
    }

    pub fn depth_attachment(&self) -> Option<&TextureRef> {
        self.depth.as_ref()
    }

    /// Whether any color or depth buffer is attached.
    pub fn has_attachments(&self) -> bool {
        !self.color.is_empty() || self.depth.is_some()
    }

    /// Detach every draw buffer.
    pub fn clear_attachments(&mut self) {
        self.color.clear();
        self.depth = None;
    }

    /// Attach `texture` as the next color draw buffer.
    pub fn attach_color(&mut self, texture: TextureRef) {
        self.color.push(texture);
    }

    pub fn attach_depth(&mut self, texture: TextureRef) {
        self.depth = Some(texture);
    }

    /// Allocate a depth texture at the target's size and attach it.
    pub fn attach_new_depth(&mut self) -> TextureRef {
        let texture = Texture::depth(self.width, self.height).into_ref();
        self.depth = Some(texture.clone());
        texture
    }

    /// Rebuild the draw buffers for a pass.
    ///
    /// Attachment order mirrors the pass's declared color outputs. The depth
    /// attachment is independent of that order. Newly allocated textures are
    /// registered in `resources` under their output id.
    pub fn configure(&mut self, pass: &PassDescriptor, resources: &mut ResourceCache) {
        let viewport = pass.viewport();

        self.clear_attachments();
        self.set_size(viewport.width, viewport.height);

        if let Some(id) = pass.depth_output() {
            match resources.get(id).cloned() {
                Some(cached) => {
                    cached.borrow_mut().set_size(viewport.width, viewport.height);
                    self.attach_depth(cached);
                }
                None => {
                    log::debug!("[render-target] Allocating depth output '{}'", id);
                    let texture = self.attach_new_depth();
                    resources.insert(id, texture);
                }
            }
        }

        for output in pass.color_outputs() {
            match resources.get(&output.id).cloned() {
                Some(cached) => {
                    {
                        let mut texture = cached.borrow_mut();
                        texture.apply_config(&output.config);
                        texture.set_size(viewport.width, viewport.height);
                    }
                    self.attach_color(cached);
                }
                None => {
                    log::debug!("[render-target] Allocating color output '{}'", output.id);
                    let texture = Texture::new(output.config, viewport.width, viewport.height).into_ref();
                    self.attach_color(texture.clone());
                    resources.insert(output.id.clone(), texture);
                }
            }
        }
    }
}
