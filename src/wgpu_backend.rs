//! The production [`RenderBackend`] over wgpu.
//!
//! Draws run in immediate mode: a batch opened by
//! [`begin`](RenderBackend::begin) fixes the blend state and shader
//! selection, and each quad flushes as its own small render pass, which is
//! what lets consecutive draws sample different sources. Every effect
//! shares one fixed uniform block ([`ShadeUniforms`]) — the named
//! parameters of the wire contract map onto its fields — so a flush is a
//! uniform upload, a bind group, and a single draw call.
//!
//! # Effect shaders
//!
//! An effect is a WGSL module declaring the shared bind group layout:
//!
//! ```wgsl
//! struct ShadeUniforms {
//!     resolution: vec2f,
//!     focus: vec2f,
//!     light_pos: vec4f,
//!     light_data: vec4f,
//!     threshold: f32,
//!     blend_strength: f32,
//!     bloom_power: f32,
//!     scatter: f32,
//!     intensity: f32,
//!     time: f32,
//!     light_count: f32,
//!     _pad0: f32,
//!     target_size: vec2f,
//!     _pad1: vec2f,
//! }
//! @group(0) @binding(0) var<uniform> u: ShadeUniforms;
//! @group(0) @binding(1) var src_texture: texture_2d<f32>;
//! @group(0) @binding(2) var src_sampler: sampler;
//! @group(0) @binding(3) var aux_texture: texture_2d<f32>;
//! ```
//!
//! plus a `vs` vertex entry and one fragment entry per technique pass,
//! named `fs_` followed by the lowercased pass name (`"Extract"` →
//! `fs_extract`). The `aux_texture` binding carries whatever was last set
//! through the `tex0` parameter.

use std::collections::HashMap;

use log::debug;
use wgpu::util::DeviceExt;

use crate::backend::{Blend, BackendError, DrawSource, ParamValue, QuadDraw, RenderBackend};

/// The builtin passthrough shader used by batches with no effect applied.
const SPRITE_SHADER: &str = r#"
struct ShadeUniforms {
    resolution: vec2f,
    focus: vec2f,
    light_pos: vec4f,
    light_data: vec4f,
    threshold: f32,
    blend_strength: f32,
    bloom_power: f32,
    scatter: f32,
    intensity: f32,
    time: f32,
    light_count: f32,
    _pad0: f32,
    target_size: vec2f,
    _pad1: vec2f,
}

@group(0) @binding(0) var<uniform> u: ShadeUniforms;
@group(0) @binding(1) var src_texture: texture_2d<f32>;
@group(0) @binding(2) var src_sampler: sampler;
@group(0) @binding(3) var aux_texture: texture_2d<f32>;

struct VsIn {
    @location(0) position: vec2f,
    @location(1) uv: vec2f,
    @location(2) alpha: f32,
}

struct VsOut {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
    @location(1) alpha: f32,
}

@vertex
fn vs(vertex: VsIn) -> VsOut {
    var out: VsOut;
    let ndc = vec2f(
        vertex.position.x / u.target_size.x * 2.0 - 1.0,
        1.0 - vertex.position.y / u.target_size.y * 2.0,
    );
    out.position = vec4f(ndc, 0.0, 1.0);
    out.uv = vertex.uv;
    out.alpha = vertex.alpha;
    return out;
}

@fragment
fn fs(fragment: VsOut) -> @location(0) vec4f {
    return textureSample(src_texture, src_sampler, fragment.uv) * fragment.alpha;
}
"#;

/// All shader parameters, packed into the one uniform block every pipeline
/// shares. Field order is the wire layout; do not reorder.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ShadeUniforms {
    resolution: [f32; 2],
    focus: [f32; 2],
    light_pos: [f32; 4],
    light_data: [f32; 4],
    threshold: f32,
    blend_strength: f32,
    bloom_power: f32,
    scatter: f32,
    intensity: f32,
    time: f32,
    light_count: f32,
    _pad0: f32,
    target_size: [f32; 2],
    _pad1: [f32; 2],
}

impl Default for ShadeUniforms {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// One batched vertex: pixel position, uv, and the draw's alpha.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SpriteVertex {
    position: [f32; 2],
    uv: [f32; 2],
    alpha: f32,
}

/// A compiled multi-pass effect.
#[derive(Debug, Clone)]
pub struct WgpuEffect {
    module: wgpu::ShaderModule,
    id: u64,
}

/// A static sampled texture.
#[derive(Debug)]
pub struct WgpuTexture {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// An off-screen render target; cheap to clone, clones alias the same
/// texture.
#[derive(Debug, Clone)]
pub struct WgpuTarget {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl WgpuTarget {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

struct BatchShader {
    module: wgpu::ShaderModule,
    effect_id: u64,
    fragment_entry: String,
}

/// wgpu-backed implementation of [`RenderBackend`].
///
/// Constructed either from the host's own device/queue (the embedded case)
/// or standalone for offscreen rendering via [`offscreen`](Self::offscreen).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    backbuffer: (u32, u32),
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sprite_module: wgpu::ShaderModule,
    pipelines: HashMap<(u64, String, Blend), wgpu::RenderPipeline>,
    next_effect_id: u64,
    uniforms: ShadeUniforms,
    bound: Option<WgpuTarget>,
    blend: Blend,
    shader: Option<BatchShader>,
    aux_view: Option<wgpu::TextureView>,
    batch_source: Option<(wgpu::TextureView, u32, u32)>,
    vertices: Vec<SpriteVertex>,
}

impl WgpuBackend {
    /// Wraps a device and queue owned by the host.
    ///
    /// `format` must match the render targets the host will hand in as
    /// frame/swap buffers; `width`/`height` are the current back-buffer
    /// dimensions.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Afterglow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Afterglow Bind Group Layout"),
            entries: &[
                // uniforms
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
                // batch source texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // aux texture (tex0)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Afterglow Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sprite_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Afterglow Sprite Shader"),
            source: wgpu::ShaderSource::Wgsl(SPRITE_SHADER.into()),
        });

        Self {
            device,
            queue,
            format,
            backbuffer: (width, height),
            sampler,
            bind_group_layout,
            pipeline_layout,
            sprite_module,
            pipelines: HashMap::new(),
            next_effect_id: 1,
            uniforms: ShadeUniforms::default(),
            bound: None,
            blend: Blend::Alpha,
            shader: None,
            aux_view: None,
            batch_source: None,
            vertices: Vec::new(),
        }
    }

    /// Brings up a device with no window for offscreen rendering.
    pub fn offscreen(width: u32, height: u32) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| BackendError::Allocation(format!("no suitable adapter: {err}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Afterglow Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|err| BackendError::Allocation(format!("device creation failed: {err}")))?;

        Ok(Self::new(
            device,
            queue,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            width,
            height,
        ))
    }

    /// Updates the back-buffer dimensions after a host resolution change.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.backbuffer = (width, height);
        }
    }

    /// Compiles an effect from WGSL source. See the module docs for the
    /// entry-point and bind-group contract.
    pub fn create_effect(&mut self, source: &str, label: &str) -> WgpuEffect {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let id = self.next_effect_id;
        self.next_effect_id += 1;
        WgpuEffect { module, id }
    }

    /// Uploads a static RGBA8 texture.
    pub fn create_texture(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> WgpuTexture {
        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        WgpuTexture {
            view,
            width,
            height,
        }
    }

    fn blend_state(blend: Blend) -> wgpu::BlendState {
        match blend {
            // batch colors are premultiplied by alpha in the vertex stage
            Blend::Alpha => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            Blend::NonPremultiplied => wgpu::BlendState::ALPHA_BLENDING,
            Blend::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
        }
    }

    fn pipeline_for(
        &mut self,
        effect_id: u64,
        module: &wgpu::ShaderModule,
        fragment_entry: &str,
        blend: Blend,
    ) -> &wgpu::RenderPipeline {
        let key = (effect_id, fragment_entry.to_owned(), blend);
        if !self.pipelines.contains_key(&key) {
            let pipeline = self
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Afterglow Sprite Pipeline"),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module,
                        entry_point: Some("vs"),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<SpriteVertex>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &wgpu::vertex_attr_array![
                                0 => Float32x2,
                                1 => Float32x2,
                                2 => Float32,
                            ],
                        }],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module,
                        entry_point: Some(fragment_entry),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.format,
                            blend: Some(Self::blend_state(blend)),
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
                });
            self.pipelines.insert(key.clone(), pipeline);
        }
        &self.pipelines[&key]
    }

    fn push_quad(&mut self, quad: QuadDraw, source_width: u32, source_height: u32) {
        let size = match quad.stretch {
            Some(stretch) => stretch,
            None => glam::Vec2::new(source_width as f32, source_height as f32) * quad.scale,
        };
        let top_left = quad.position - quad.origin * quad.scale;

        let (x0, y0) = (top_left.x, top_left.y);
        let (x1, y1) = (top_left.x + size.x, top_left.y + size.y);
        let alpha = quad.alpha;

        let corners = [
            ([x0, y0], [0.0, 0.0]),
            ([x1, y0], [1.0, 0.0]),
            ([x1, y1], [1.0, 1.0]),
            ([x0, y0], [0.0, 0.0]),
            ([x1, y1], [1.0, 1.0]),
            ([x0, y1], [0.0, 1.0]),
        ];
        for (position, uv) in corners {
            self.vertices.push(SpriteVertex {
                position,
                uv,
                alpha,
            });
        }
    }

    /// Issues one render pass for the accumulated quads.
    fn flush(&mut self) {
        if self.vertices.is_empty() {
            return;
        }
        let Some(bound) = self.bound.clone() else {
            self.vertices.clear();
            return;
        };
        let Some((source_view, _, _)) = self.batch_source.clone() else {
            self.vertices.clear();
            return;
        };

        self.uniforms.target_size = [bound.width as f32, bound.height as f32];

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Afterglow Uniforms"),
                contents: bytemuck::cast_slice(&[self.uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Afterglow Vertices"),
                contents: bytemuck::cast_slice(&self.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let aux_view = self.aux_view.clone().unwrap_or_else(|| source_view.clone());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Afterglow Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&aux_view),
                },
            ],
        });

        let vertex_count = self.vertices.len() as u32;
        self.vertices.clear();

        let (effect_id, module, entry) = match &self.shader {
            Some(batch) => (
                batch.effect_id,
                batch.module.clone(),
                batch.fragment_entry.clone(),
            ),
            None => (0, self.sprite_module.clone(), "fs".to_owned()),
        };
        let blend = self.blend;
        // borrow of the cache ends before the encoder needs &self again
        let _ = self.pipeline_for(effect_id, &module, &entry, blend);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Afterglow Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &bound.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let key = (effect_id, entry, blend);
            pass.set_pipeline(&self.pipelines[&key]);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderBackend for WgpuBackend {
    type Effect = WgpuEffect;
    type Texture = WgpuTexture;
    type Target = WgpuTarget;

    fn backbuffer_size(&self) -> Option<(u32, u32)> {
        Some(self.backbuffer)
    }

    fn create_target(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<Self::Target, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::Allocation(format!(
                "zero-sized target `{label}` ({width}x{height})"
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!("allocated render target `{label}` at {width}x{height}");
        Ok(WgpuTarget {
            view,
            width,
            height,
        })
    }

    fn target_size(&self, target: &Self::Target) -> (u32, u32) {
        target.size()
    }

    fn bind_target(&mut self, target: &Self::Target) {
        self.flush();
        self.bound = Some(target.clone());
    }

    fn clear(&mut self) {
        self.flush();
        let Some(bound) = &self.bound else {
            return;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Afterglow Clear Encoder"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: None,
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &bound.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn begin(&mut self, blend: Blend) {
        self.flush();
        self.blend = blend;
        self.shader = None;
        self.aux_view = None;
        self.batch_source = None;
    }

    fn apply_effect(&mut self, effect: &Self::Effect, pass: &str) {
        self.flush();
        self.shader = Some(BatchShader {
            module: effect.module.clone(),
            effect_id: effect.id,
            fragment_entry: format!("fs_{}", pass.to_lowercase()),
        });
    }

    fn set_param(&mut self, name: &str, value: ParamValue<'_, Self>) {
        self.flush();
        match (name, value) {
            ("uScreenResolution", ParamValue::Vec2(v)) => self.uniforms.resolution = v.to_array(),
            ("uPos", ParamValue::Vec2(v)) => self.uniforms.focus = v.to_array(),
            ("uLightPos", ParamValue::Vec4(v)) => self.uniforms.light_pos = v.to_array(),
            ("uLightData", ParamValue::Vec4(v)) => self.uniforms.light_data = v.to_array(),
            ("uLightCount", ParamValue::Int(count)) => self.uniforms.light_count = count as f32,
            ("m", ParamValue::Float(v)) => self.uniforms.threshold = v,
            ("m2", ParamValue::Float(v)) => self.uniforms.blend_strength = v,
            ("p", ParamValue::Float(v)) => self.uniforms.bloom_power = v,
            ("bloomScatter", ParamValue::Float(v)) => self.uniforms.scatter = v,
            ("intensity", ParamValue::Float(v)) => self.uniforms.intensity = v,
            ("t", ParamValue::Float(v)) => self.uniforms.time = v,
            ("tex0", ParamValue::Texture(texture)) => {
                self.aux_view = Some(texture.view.clone());
            }
            ("tex0", ParamValue::Target(target)) => {
                self.aux_view = Some(target.view.clone());
            }
            (other, _) => debug!("ignoring unknown shader parameter `{other}`"),
        }
    }

    fn draw(&mut self, source: DrawSource<'_, Self>, quad: QuadDraw) {
        let (view, width, height) = match source {
            DrawSource::Texture(texture) => (texture.view.clone(), texture.width, texture.height),
            DrawSource::Target(target) => (target.view.clone(), target.width, target.height),
        };

        // immediate mode: every draw flushes on its own, so consecutive
        // draws are free to switch sources
        self.batch_source = Some((view, width, height));
        self.push_quad(quad, width, height);
        self.flush();
    }

    fn end(&mut self) {
        self.flush();
        self.shader = None;
        self.aux_view = None;
        self.batch_source = None;
    }
}
