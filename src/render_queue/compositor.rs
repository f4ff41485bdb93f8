//! The fixed full-screen quad used by merge passes.

use super::pass::MaterialRef;
use crate::camera::Camera;
use crate::texture::TextureRef;
use glam::Vec2;

/// A material that samples an ordered list of input textures ("maps").
pub trait MergeMaterial {
    /// Detach every previously attached input.
    fn clear_maps(&mut self);

    /// Attach `texture` as the next input.
    fn add_map(&mut self, texture: TextureRef);

    /// Inputs in attachment order.
    fn maps(&self) -> &[TextureRef];
}

/// An axis-aligned quad spanning two corners in clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub top_left: Vec2,
    pub bottom_right: Vec2,
    /// Merge quads always cover the whole target and are never culled.
    pub frustum_culled: bool,
}

impl Quad {
    pub fn new(top_left: Vec2, bottom_right: Vec2) -> Self {
        Self {
            top_left,
            bottom_right,
            frustum_culled: true,
        }
    }

    /// The quad covering all of clip space.
    pub fn fullscreen() -> Self {
        Self {
            frustum_culled: false,
            ..Self::new(Vec2::new(-1.0, 1.0), Vec2::new(1.0, -1.0))
        }
    }

    /// Corner positions as two counter-clockwise triangles.
    pub fn triangles(&self) -> [Vec2; 6] {
        let (tl, br) = (self.top_left, self.bottom_right);
        let tr = Vec2::new(br.x, tl.y);
        let bl = Vec2::new(tl.x, br.y);
        [bl, br, tr, bl, tr, tl]
    }
}

/// Full-screen quad + orthographic camera with a swappable material.
///
/// Merge passes do not bring a scene of their own: the render queue assigns the
/// pass's material to this quad and renders it instead.
pub struct MergeCompositor<M> {
    quad: Quad,
    material: Option<MaterialRef<M>>,
    camera: Camera,
}

impl<M> Default for MergeCompositor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MergeCompositor<M> {
    pub fn new() -> Self {
        Self {
            quad: Quad::fullscreen(),
            material: None,
            // Looks down -Z; the quad sits between the near and far planes.
            camera: Camera::orthographic(-1.0, 1.0, 1.0, -1.0, 1.0, 2.0),
        }
    }

    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The material currently assigned to the quad.
    pub fn material(&self) -> Option<&MaterialRef<M>> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: MaterialRef<M>) {
        self.material = Some(material);
    }
}

impl<M: MergeMaterial> MergeCompositor<M> {
    /// Replace the material's inputs with `inputs`, in order, and assign it to the quad.
    pub fn bind(&mut self, material: MaterialRef<M>, inputs: Vec<TextureRef>) {
        {
            let mut material = material.borrow_mut();
            material.clear_maps();
            for texture in inputs {
                material.add_map(texture);
            }
        }
        self.set_material(material);
    }
}
