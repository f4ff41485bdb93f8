//! WGSL material used by merge passes on the wgpu renderer.

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::gpu_renderer::FrameTarget;
use crate::render_queue::{MergeMaterial, Quad};
use crate::texture::TextureRef;
use std::collections::HashMap;

/// Uniforms shared by every composite shader.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub resolution: [f32; 2],
    pub map_count: u32,
    pub _padding: u32,
}

/// Depth of the quad in view space: halfway between the compositor camera's planes.
const QUAD_DEPTH: f32 = -1.5;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    maps: Vec<wgpu::TextureSampleType>,
}

struct CompiledPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

struct GpuState {
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    pipelines: HashMap<PipelineKey, CompiledPipeline>,
}

/// A full-screen material defined by a WGSL fragment stage over N input maps.
///
/// The fragment source must define `fs`, taking the generated `VertexOutput`
/// (`position`, `uv`). Each attached map `i` is declared as `map_i` with a
/// matching `map_i_sampler`, and the uniforms are available as `u`:
///
/// ```wgsl
/// @fragment
/// fn fs(in: VertexOutput) -> @location(0) vec4f {
///     return textureSample(map_0, map_0_sampler, in.uv) * 0.5
///          + textureSample(map_1, map_1_sampler, in.uv) * 0.5;
/// }
/// ```
///
/// Depth maps are declared as `texture_depth_2d`, integer maps as
/// `texture_2d<i32>`/`texture_2d<u32>`. Pipelines are compiled on first use for
/// every combination of target formats and map types, then cached.
pub struct ShaderMaterial {
    label: String,
    fragment: String,
    maps: Vec<TextureRef>,
    gpu: Option<GpuState>,
}

impl ShaderMaterial {
    pub fn new(label: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fragment: fragment.into(),
            maps: Vec::new(),
            gpu: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the fragment source. Cached pipelines are discarded.
    pub fn set_fragment(&mut self, fragment: impl Into<String>) {
        self.fragment = fragment.into();
        if let Some(state) = &mut self.gpu {
            state.pipelines.clear();
        }
    }

    /// Number of compiled pipeline variants.
    pub fn pipeline_count(&self) -> usize {
        self.gpu.as_ref().map_or(0, |state| state.pipelines.len())
    }

    /// Draw `quad` through `camera` into the current render pass.
    pub(crate) fn draw(
        &mut self,
        gpu: &GpuContext,
        render_pass: &mut wgpu::RenderPass<'_>,
        quad: &Quad,
        camera: &Camera,
        target: &FrameTarget<'_>,
    ) {
        // Realise inputs first so their allocations match their current size.
        let mut bindings = Vec::with_capacity(self.maps.len());
        for map in &self.maps {
            let mut texture = map.borrow_mut();
            let sample_type = texture.sample_type();
            let realized = texture.realize(gpu);
            bindings.push((sample_type, realized.view.clone(), realized.sampler.clone()));
        }

        let key = PipelineKey {
            color_formats: target.color_formats.to_vec(),
            depth_format: target.depth_format,
            maps: bindings.iter().map(|(sample_type, _, _)| *sample_type).collect(),
        };

        let label = &self.label;
        let fragment = &self.fragment;
        let state = self.gpu.get_or_insert_with(|| GpuState::new(gpu, label));
        let compiled = state
            .pipelines
            .entry(key)
            .or_insert_with_key(|key| CompiledPipeline::new(gpu, label, fragment, key));

        let vertices = quad.triangles().map(|corner| corner.to_array());
        gpu.queue
            .write_buffer(&state.vertex_buffer, 0, bytemuck::cast_slice(&vertices));

        let uniforms = CompositeUniforms {
            view_projection: camera.view_projection().to_cols_array_2d(),
            resolution: [target.viewport.width as f32, target.viewport.height as f32],
            map_count: bindings.len() as u32,
            _padding: 0,
        };
        gpu.queue
            .write_buffer(&state.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: state.uniform_buffer.as_entire_binding(),
        }];
        for (i, (_, view, sampler)) in bindings.iter().enumerate() {
            let binding = 1 + 2 * i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite Bind Group"),
            layout: &compiled.bind_group_layout,
            entries: &entries,
        });

        render_pass.set_pipeline(&compiled.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.set_vertex_buffer(0, state.vertex_buffer.slice(..));
        render_pass.draw(0..6, 0..1);
    }
}

impl MergeMaterial for ShaderMaterial {
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

impl std::fmt::Debug for ShaderMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderMaterial")
            .field("label", &self.label)
            .field("maps", &self.maps.len())
            .field("pipelines", &self.pipeline_count())
            .finish()
    }
}

impl GpuState {
    fn new(gpu: &GpuContext, label: &str) -> Self {
        let vertex_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Quad")),
            size: std::mem::size_of::<[[f32; 2]; 6]>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Uniforms")),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            vertex_buffer,
            uniform_buffer,
            pipelines: HashMap::new(),
        }
    }
}

impl CompiledPipeline {
    fn new(gpu: &GpuContext, label: &str, fragment: &str, key: &PipelineKey) -> Self {
        log::debug!(
            "[material] Compiling '{}' for {:?} with {} map(s)",
            label,
            key.color_formats,
            key.maps.len()
        );
        let device = &gpu.device;

        let source = format!("{}\n{}", preamble(&key.maps), fragment);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (i, sample_type) in key.maps.iter().enumerate() {
            let binding = 1 + 2 * i as u32;
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: *sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            let sampler = match sample_type {
                wgpu::TextureSampleType::Float { filterable: true } => wgpu::SamplerBindingType::Filtering,
                _ => wgpu::SamplerBindingType::NonFiltering,
            };
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &layout_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let targets: Vec<_> = key
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // The quad is never culled.
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }
}

/// Generated WGSL: uniforms, vertex stage and one texture/sampler pair per map.
fn preamble(maps: &[wgpu::TextureSampleType]) -> String {
    let mut source = format!(
        r#"struct Uniforms {{
    view_projection: mat4x4f,
    resolution: vec2f,
    map_count: u32,
    _padding: u32,
}}
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {{
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}}

@vertex
fn vs(@location(0) corner: vec2f) -> VertexOutput {{
    var out: VertexOutput;
    out.position = u.view_projection * vec4f(corner, {QUAD_DEPTH:.1}, 1.0);
    out.uv = vec2f(corner.x * 0.5 + 0.5, 0.5 - corner.y * 0.5);
    return out;
}}
"#
    );

    for (i, sample_type) in maps.iter().enumerate() {
        let binding = 1 + 2 * i;
        let texture = match sample_type {
            wgpu::TextureSampleType::Depth => "texture_depth_2d",
            wgpu::TextureSampleType::Sint => "texture_2d<i32>",
            wgpu::TextureSampleType::Uint => "texture_2d<u32>",
            wgpu::TextureSampleType::Float { .. } => "texture_2d<f32>",
        };
        source.push_str(&format!(
            "@group(0) @binding({binding}) var map_{i}: {texture};\n\
             @group(0) @binding({}) var map_{i}_sampler: sampler;\n",
            binding + 1
        ));
    }

    source
}
