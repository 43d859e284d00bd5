//! zview viewport - wgpu rendering of a [`Scene`] plus the egui overlay.
//!
//! The [`Renderer`] mirrors the scene's groups on the GPU: one vertex/index
//! buffer pair per prototype and one instance buffer holding the model
//! matrices of every instance of that prototype. Geometry is rebuilt when the
//! scene's revision changes; instance matrices are rewritten every frame so
//! animation shows up without a rebuild.

use std::sync::Arc;

use anyhow::Result;
use wgpu::{util::DeviceExt, Device, Instance, Queue, Surface, SurfaceConfiguration};
use winit::window::Window;

use zview_core::{EnvironmentMap, Group, GroupId, LightRig, Mesh, Prototype, Scene};
use zview_math::{Camera, Vec3};

pub mod frame_loop;
pub mod ui;

pub use frame_loop::{FrameLoop, DEFAULT_FRAME_INTERVAL};
pub use ui::{draw_overlay, OverlayActions, OverlayState, OverlayStatus, SceneStats};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
}

impl CameraUniform {
    fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            eye: camera.position.extend(1.0).to_array(),
        }
    }
}

/// Light rig uniform data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LightUniform {
    sky: [f32; 4],
    ground: [f32; 4],
    sun_color: [f32; 4],
    sun_direction: [f32; 4],
}

impl LightUniform {
    fn from_rig(lights: &LightRig) -> Self {
        let hemi = &lights.hemisphere;
        let sun = &lights.directional;
        Self {
            sky: hemi.sky_color.extend(hemi.intensity).to_array(),
            ground: hemi.ground_color.extend(1.0).to_array(),
            sun_color: sun.color.extend(sun.intensity).to_array(),
            sun_direction: sun.direction.extend(0.0).to_array(),
        }
    }
}

/// Vertex data for rendering
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    /// GPU vertices for a mesh drawn in a single color.
    pub fn from_mesh(mesh: &Mesh, color: Vec3) -> Vec<Vertex> {
        // Normals should already be computed by the loader
        let default_normal = Vec3::Y;

        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, pos)| {
                let normal = mesh
                    .normals
                    .as_ref()
                    .and_then(|n| n.get(i))
                    .unwrap_or(&default_normal);

                Vertex {
                    position: pos.to_array(),
                    normal: normal.to_array(),
                    color: color.to_array(),
                }
            })
            .collect()
    }
}

/// Instance data for GPU instancing
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model_matrix: [[f32; 4]; 4],
}

impl InstanceData {
    const ATTRIBS: [wgpu::VertexAttribute; 4] =
        wgpu::vertex_attr_array![3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Current model matrices of a group, bucketed by prototype.
pub fn instance_buckets(group: &Group) -> Vec<Vec<InstanceData>> {
    let mut buckets = vec![Vec::new(); group.prototypes.len()];
    for instance in &group.instances {
        if let Some(bucket) = buckets.get_mut(instance.prototype_id) {
            bucket.push(InstanceData {
                model_matrix: instance.model_matrix().to_cols_array_2d(),
            });
        }
    }
    buckets
}

/// GPU buffers for one prototype.
struct GpuPrototype {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    num_instances: u32,
}

impl GpuPrototype {
    fn new(device: &Device, prototype: &Prototype) -> Self {
        let vertices = Vertex::from_mesh(&prototype.mesh, prototype.color);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(&prototype.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: prototype.mesh.indices.len() as u32,
            instance_buffer: Self::create_instance_buffer(device, 1),
            instance_capacity: 1,
            num_instances: 0,
        }
    }

    fn create_instance_buffer(device: &Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (capacity * std::mem::size_of::<InstanceData>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Write this frame's instance matrices, growing the buffer if needed.
    fn upload_instances(&mut self, device: &Device, queue: &Queue, instances: &[InstanceData]) {
        if instances.len() > self.instance_capacity {
            self.instance_capacity = instances.len().next_power_of_two();
            self.instance_buffer = Self::create_instance_buffer(device, self.instance_capacity);
        }
        if !instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(instances));
        }
        self.num_instances = instances.len() as u32;
    }
}

/// GPU mirror of one scene group.
struct GpuGroup {
    id: GroupId,
    visible: bool,
    prototypes: Vec<GpuPrototype>,
}

/// Core renderer managing wgpu state
pub struct Renderer {
    pub surface: Surface<'static>,
    pub device: Device,
    pub queue: Queue,
    pub config: SurfaceConfiguration,
    pub size: (u32, u32),
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    _environment_texture: wgpu::Texture,
    environment_bind_group: wgpu::BindGroup,
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,

    // Scene mirror
    groups: Vec<GpuGroup>,
    synced_revision: Option<u64>,
    stats: SceneStats,

    // egui state
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // UI state
    pub overlay: OverlayState,
    pub fps: f32,
    frame_count: u32,
    fps_update_timer: f32,
}

impl Renderer {
    /// Create a depth texture for the given size
    fn create_depth_texture(device: &Device, size: (u32, u32)) -> (wgpu::Texture, wgpu::TextureView) {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        (depth_texture, depth_view)
    }

    /// Upload the environment map as a float texture.
    ///
    /// Maps larger than the device allows collapse to their average color.
    fn create_environment(
        device: &Device,
        queue: &Queue,
        layout: &wgpu::BindGroupLayout,
        environment: &EnvironmentMap,
    ) -> (wgpu::Texture, wgpu::BindGroup) {
        let max_side = device.limits().max_texture_dimension_2d;
        let fallback;
        let environment = if environment.width > max_side || environment.height > max_side {
            log::warn!(
                "Environment map {}x{} exceeds the GPU limit of {}, using its average color",
                environment.width,
                environment.height,
                max_side
            );
            fallback = EnvironmentMap::constant(environment.average());
            &fallback
        } else {
            environment
        };

        let size = wgpu::Extent3d {
            width: environment.width,
            height: environment.height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Environment Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&environment.pixels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(16 * environment.width),
                rows_per_image: Some(environment.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Environment Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            }],
        });

        (texture, bind_group)
    }

    /// Create a renderer for `window`, lit by the scene's lights and environment.
    pub async fn new(window: Arc<Window>, scene: &Scene, camera: &Camera) -> Result<Self> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        // Create surface
        let surface = instance.create_surface(window.clone())?;

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        // Request device and queue
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("zview Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        // Camera and light uniforms share bind group 0
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform::from_camera(camera)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[LightUniform::from_rig(scene.lights())]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Uniform Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
        });

        // Float textures are not filterable everywhere; the shader uses textureLoad
        let environment_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Environment Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                }],
            });

        let (environment_texture, environment_bind_group) = Self::create_environment(
            &device,
            &queue,
            &environment_bind_group_layout,
            scene.environment(),
        );

        // Create shader module
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        // Create render pipeline
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &environment_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc(), InstanceData::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Cw, // USD uses clockwise winding
                cull_mode: None,                  // doubleSided is not read, draw both faces
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // Create depth texture
        let (depth_texture, depth_view) =
            Self::create_depth_texture(&device, (config.width, config.height));

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None, // max_texture_side (use default)
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &device,
            config.format,
            None, // No depth testing for egui
            1,
            false, // dithering
        );

        log::info!(
            "Renderer initialized: {}x{}, format {:?}",
            config.width,
            config.height,
            config.format
        );

        Ok(Self {
            surface,
            device,
            queue,
            size: (config.width, config.height),
            config,
            pipeline,
            camera_buffer,
            uniform_bind_group,
            _environment_texture: environment_texture,
            environment_bind_group,
            depth_texture,
            depth_view,
            groups: Vec::new(),
            synced_revision: None,
            stats: SceneStats::default(),
            egui_ctx,
            egui_state,
            egui_renderer,
            overlay: OverlayState::default(),
            fps: 0.0,
            frame_count: 0,
            fps_update_timer: 0.0,
        })
    }

    /// Keep the surface, depth buffer and camera projection in step with the window.
    ///
    /// Zero-sized (minimized) windows are ignored.
    pub fn resize(&mut self, new_size: (u32, u32), camera: &mut Camera) {
        if new_size.0 == 0 || new_size.1 == 0 {
            return;
        }

        self.size = new_size;
        self.config.width = new_size.0;
        self.config.height = new_size.1;
        self.surface.configure(&self.device, &self.config);

        // Recreate depth texture with new size
        let (depth_texture, depth_view) = Self::create_depth_texture(&self.device, new_size);
        self.depth_texture = depth_texture;
        self.depth_view = depth_view;

        camera.set_aspect(Camera::aspect_for(new_size.0, new_size.1));
        camera.update_projection();
        self.update_camera(camera);
    }

    /// Reconfigure the surface at its current size (after `SurfaceError::Lost`).
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Update camera uniform buffer (call after modifying camera)
    pub fn update_camera(&mut self, camera: &Camera) {
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[CameraUniform::from_camera(camera)]),
        );
    }

    /// Mirror the scene: rebuild geometry after structural changes, then
    /// upload every visible group's current instance matrices.
    pub fn sync_scene(&mut self, scene: &Scene) {
        if self.synced_revision != Some(scene.revision()) {
            self.rebuild_geometry(scene);
            self.synced_revision = Some(scene.revision());
        }

        let mut stats = SceneStats::default();

        for gpu_group in &mut self.groups {
            let Some(group) = scene.group(gpu_group.id) else {
                gpu_group.visible = false;
                continue;
            };

            gpu_group.visible = group.visible;
            if !group.visible {
                continue;
            }

            let buckets = instance_buckets(group);
            for (prototype, instances) in gpu_group.prototypes.iter_mut().zip(&buckets) {
                prototype.upload_instances(&self.device, &self.queue, instances);
            }

            stats.instances += group.instance_count();
            stats.triangles += group.total_triangle_count();
        }

        self.stats = stats;
    }

    fn rebuild_geometry(&mut self, scene: &Scene) {
        let groups: Vec<GpuGroup> = scene
            .groups()
            .map(|(id, group)| GpuGroup {
                id,
                visible: group.visible,
                prototypes: group
                    .prototypes
                    .iter()
                    .map(|prototype| GpuPrototype::new(&self.device, prototype))
                    .collect(),
            })
            .collect();

        log::debug!(
            "Rebuilt GPU geometry for {} groups (scene revision {})",
            groups.len(),
            scene.revision()
        );

        self.groups = groups;
    }

    /// Handle egui window event - returns true if event was consumed by egui
    pub fn handle_egui_event(&mut self, window: &Window, event: &winit::event::WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        response.consumed
    }

    /// Update FPS counter (call each frame with delta_time)
    pub fn update_fps(&mut self, delta_time: f32) {
        self.frame_count += 1;
        self.fps_update_timer += delta_time;

        // Update FPS every 0.5 seconds
        if self.fps_update_timer >= 0.5 {
            self.fps = self.frame_count as f32 / self.fps_update_timer;
            self.frame_count = 0;
            self.fps_update_timer = 0.0;
        }
    }

    /// Render visible groups, then the overlay. Returns what the user clicked.
    pub fn render(
        &mut self,
        clear_color: wgpu::Color,
        window: &Window,
        camera: &Camera,
        status: OverlayStatus<'_>,
    ) -> Result<OverlayActions> {
        self.update_camera(camera);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // Prepare egui UI
        let raw_input = self.egui_state.take_egui_input(window);

        let status = OverlayStatus {
            stats: SceneStats {
                fps: self.fps,
                ..self.stats
            },
            ..status
        };
        let overlay = &mut self.overlay;
        let mut actions = OverlayActions::default();

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            actions = ui::draw_overlay(ctx, overlay, &status);
        });

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.size.0, self.size.1],
            pixels_per_point: window.scale_factor() as f32,
        };

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        // Upload egui textures
        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        // Prepare egui render pass
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        // Main render pass
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, &self.environment_bind_group, &[]);

            // One instanced draw per prototype
            for group in self.groups.iter().filter(|g| g.visible) {
                for prototype in &group.prototypes {
                    if prototype.num_instances == 0 || prototype.num_indices == 0 {
                        continue;
                    }
                    render_pass.set_vertex_buffer(0, prototype.vertex_buffer.slice(..));
                    render_pass.set_vertex_buffer(1, prototype.instance_buffer.slice(..));
                    render_pass
                        .set_index_buffer(prototype.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..prototype.num_indices, 0, 0..prototype.num_instances);
                }
            }
        }

        // Render egui on top
        {
            let mut egui_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime(); // Need 'static lifetime for egui renderer

            self.egui_renderer
                .render(&mut egui_pass, &paint_jobs, &screen_descriptor);
        }

        // Free egui textures
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zview_core::group::DEFAULT_COLOR;
    use zview_math::Mat4;

    fn triangle() -> Arc<Mesh> {
        let mut mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            None,
        );
        mesh.ensure_normals();
        Arc::new(mesh)
    }

    #[test]
    fn test_vertices_carry_prototype_color() {
        let color = Vec3::new(1.0, 0.0, 0.0);
        let vertices = Vertex::from_mesh(&triangle(), color);

        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[2].color, [1.0, 0.0, 0.0]);
        let n = Vec3::from_array(vertices[0].normal);
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_instance_buckets_group_by_prototype() {
        let mut group = Group::new("g");
        let a = group.add_prototype(triangle(), "a".to_string(), DEFAULT_COLOR);
        let b = group.add_prototype(triangle(), "b".to_string(), DEFAULT_COLOR);
        group.add_instance(a, None, Mat4::IDENTITY);
        group.add_instance(b, None, Mat4::from_translation(Vec3::X));
        group.add_instance(a, None, Mat4::from_translation(Vec3::Y));

        let buckets = instance_buckets(&group);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].len(), 2);
        assert_eq!(buckets[1].len(), 1);
        assert!((buckets[1][0].model_matrix[3][0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_uniform_layouts() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
        assert_eq!(std::mem::size_of::<LightUniform>(), 64);

        let lights = LightUniform::from_rig(&LightRig::default());
        assert_eq!(lights.sky[3], 1.0);
        assert!(lights.sun_direction[1] < 0.0);
    }
}
