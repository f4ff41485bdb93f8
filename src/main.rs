use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use multipass::{
    Camera, DataStore, Destination, FrameTarget, GpuContext, GpuRenderer, GpuScene, ImageLoader,
    MaterialRef, PassLogic, PassOutput, RenderPass, RenderQueue, Renderer, ResourceCache, ShaderMaterial,
    Texture, TextureConfig, TextureRef, Viewport,
};

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PlasmaUniforms {
    resolution: [f32; 2],
    time: f32,
    _padding: f32,
}

struct PlasmaGpu {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    bind_group_layout: wgpu::BindGroupLayout,
    shader: wgpu::ShaderModule,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl PlasmaGpu {
    fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Plasma Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/plasma.wgsl").into()),
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Plasma Uniforms"),
            size: std::mem::size_of::<PlasmaUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Plasma Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Plasma Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        Self {
            uniform_buffer,
            bind_group,
            bind_group_layout,
            shader,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, gpu: &GpuContext, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let Self {
            bind_group_layout,
            shader,
            pipelines,
            ..
        } = self;
        pipelines.entry(format).or_insert_with(|| {
            let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Plasma Pipeline Layout"),
                bind_group_layouts: &[&*bind_group_layout],
                push_constant_ranges: &[],
            });
            gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Plasma Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &*shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &*shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
    }
}

/// Animated full-screen plasma.
#[derive(Default)]
struct PlasmaScene {
    time: Cell<f32>,
    gpu: RefCell<Option<PlasmaGpu>>,
}

impl GpuScene for PlasmaScene {
    fn draw(&self, gpu: &GpuContext, render_pass: &mut wgpu::RenderPass<'_>, _camera: &Camera, target: &FrameTarget<'_>) {
        let Some(&format) = target.color_formats.first() else {
            return;
        };
        let mut state = self.gpu.borrow_mut();
        let state = state.get_or_insert_with(|| PlasmaGpu::new(gpu));

        let uniforms = PlasmaUniforms {
            resolution: [target.viewport.width as f32, target.viewport.height as f32],
            time: self.time.get(),
            _padding: 0.0,
        };
        gpu.queue
            .write_buffer(&state.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let pipeline = state.pipeline(gpu, format).clone();
        render_pass.set_pipeline(&pipeline);
        render_pass.set_bind_group(0, &state.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

/// Direct pass that renders the plasma at the time seeded for this frame.
struct PlasmaPass {
    scene: PlasmaScene,
    camera: Camera,
}

impl PassLogic<GpuRenderer> for PlasmaPass {
    fn initialize(&mut self, _resources: &mut ResourceCache, data: &mut DataStore) {
        log::info!("[demo] Plasma pass initialized");
        data.insert("frames", 0u64);
    }

    fn preprocess<'a>(&'a mut self, _resources: &mut ResourceCache, data: &mut DataStore) -> PassOutput<'a, GpuRenderer> {
        if let Some(&time) = data.get::<f32>("time") {
            self.scene.time.set(time);
        }
        if let Some(frames) = data.get_mut::<u64>("frames") {
            *frames += 1;
        }
        PassOutput::Scene {
            scene: &self.scene,
            camera: &self.camera,
        }
    }
}

fn build_queue(material: MaterialRef<ShaderMaterial>, size: Viewport) -> RenderQueue<GpuRenderer> {
    let mut queue = RenderQueue::new();

    let plasma = RenderPass::direct(
        Destination::OffscreenTexture,
        Viewport::new(512, 512),
        PlasmaPass {
            scene: PlasmaScene::default(),
            camera: Camera::new(),
        },
    )
    .with_color_output("plasma", TextureConfig::new())
    .into_ref();

    let composite = RenderPass::merge(
        Destination::Screen,
        size,
        move |resources: &mut ResourceCache, _: &mut DataStore| {
            let inputs: Vec<TextureRef> = ["plasma", "overlay"]
                .iter()
                .filter_map(|id| resources.get(id).cloned())
                .collect();
            if inputs.len() < 2 {
                return PassOutput::<GpuRenderer>::Skip;
            }
            PassOutput::Merge {
                material: material.clone(),
                inputs,
            }
        },
    )
    .into_ref();

    if let Err(err) = queue.set_queue(vec![plasma, composite]) {
        log::error!("[demo] {}", err);
    }
    queue.store_queue("default");

    // Until an overlay image arrives, blend against plain white.
    queue.seed_resource("overlay", Texture::from_rgba(vec![255; 4], 1, 1).into_ref());
    queue
}

struct App {
    window: Option<Arc<Window>>,
    renderer: Option<GpuRenderer>,
    queue: Option<RenderQueue<GpuRenderer>>,
    loader: ImageLoader,
    overlay: Rc<RefCell<Option<TextureRef>>>,
    start_time: Instant,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            renderer: None,
            queue: None,
            loader: ImageLoader::new(),
            overlay: Rc::new(RefCell::new(None)),
            start_time: Instant::now(),
        }
    }
}

impl App {
    fn load_overlay(&mut self, path: &str) {
        let slot = self.overlay.clone();
        self.loader.load(
            path,
            move |image| {
                *slot.borrow_mut() = Some(Texture::from_image(&image).into_ref());
            },
            |err| log::warn!("[demo] Overlay unavailable: {}", err),
        );
    }

    fn redraw(&mut self) {
        self.loader.poll();

        let (Some(renderer), Some(queue)) = (&mut self.renderer, &mut self.queue) else {
            return;
        };

        if let Some(texture) = self.overlay.borrow_mut().take() {
            queue.seed_resource("overlay", texture);
        }
        queue.seed_data("time", self.start_time.elapsed().as_secs_f32());

        if let Err(aborted) = queue.execute(renderer) {
            log::warn!("[demo] {}", aborted);
        }
        renderer.present();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = match event_loop.create_window(Window::default_attributes().with_title("multipass")) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("[demo] Could not create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        let gpu = match GpuContext::new(window.clone()) {
            Ok(gpu) => gpu,
            Err(err) => {
                log::error!("[demo] {}", err);
                event_loop.exit();
                return;
            }
        };
        let renderer = GpuRenderer::new(gpu);

        let material = Rc::new(RefCell::new(ShaderMaterial::new(
            "Vignette",
            include_str!("shaders/vignette.wgsl"),
        )));
        self.queue = Some(build_queue(material, renderer.viewport()));
        self.renderer = Some(renderer);
        self.window = Some(window);

        if let Some(path) = std::env::args().nth(1) {
            self.load_overlay(&path);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size.width, size.height);
                }
                if let Some(queue) = &self.queue {
                    // The composite pass is last; keep it matching the window.
                    if let Some(pass) = queue.passes().last() {
                        pass.borrow_mut().set_viewport(Viewport::new(size.width.max(1), size.height.max(1)));
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("[demo] {}", err);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("[demo] {}", err);
    }
}
