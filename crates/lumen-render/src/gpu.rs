//! GPU backend: headless wgpu device, pooled render targets, and the renderer
//! that draws fused programs and dedicated chain stages as full-screen
//! triangles.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use wgpu::{
    Adapter, Device, Extent3d, Instance, Queue, Texture, TextureDescriptor, TextureFormat,
    TextureUsages,
};

use lumen_core::{Color, LumenError, LumenResult, Surface};
use lumen_fx::codegen::{FRAGMENT_ENTRY, VERTEX_ENTRY};
use lumen_fx::{Binding, FrameUniforms, FusedProgram, ProgramId, Resource};

use crate::effect::{FrameContext, GpuStage, StageTexture};
use crate::pass::EffectPass;

/// Format of every render target and of uploaded color textures.
pub const TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// Depth and velocity keep full precision.
pub const DATA_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

const TARGET_USAGE: TextureUsages = TextureUsages::RENDER_ATTACHMENT
    .union(TextureUsages::TEXTURE_BINDING)
    .union(TextureUsages::COPY_SRC);

#[derive(Hash, Eq, PartialEq, Clone)]
struct TextureDescKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsages,
}

#[derive(Default)]
pub struct TexturePool {
    free_textures: Mutex<HashMap<TextureDescKey, Vec<Texture>>>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(
        &self,
        device: &Device,
        label: Option<&str>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Texture {
        let key = TextureDescKey {
            width,
            height,
            format,
            usage,
        };
        if let Some(texture) = self.free_textures.lock().get_mut(&key).and_then(Vec::pop) {
            return texture;
        }

        device.create_texture(&TextureDescriptor {
            label,
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    pub fn release(&self, texture: Texture) {
        let size = texture.size();
        let key = TextureDescKey {
            width: size.width,
            height: size.height,
            format: texture.format(),
            usage: texture.usage(),
        };
        self.free_textures.lock().entry(key).or_default().push(texture);
    }

    /// Drop every pooled texture, e.g. after a resize.
    pub fn clear(&self) {
        self.free_textures.lock().clear();
    }
}

/// A shared context for all GPU operations.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
    pub texture_pool: TexturePool,
}

impl GpuContext {
    /// Initializes WGPU, selecting the best available backend (Metal, Vulkan, DX12, etc.)
    pub fn init() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // headless
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow::anyhow!("Failed to find suitable wgpu adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Lumen Headless GPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))?;

        tracing::info!(adapter = ?adapter.get_info().name, "initialized GPU context");
        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            texture_pool: TexturePool::new(),
        })
    }
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    /// One layout per bind group, in group order.
    layouts: Vec<wgpu::BindGroupLayout>,
    bindings: Vec<Binding>,
}

struct StagePipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

/// A resource owned for the duration of one bind group creation.
enum Bound<'s> {
    View(wgpu::TextureView),
    Buffer(wgpu::Buffer),
    Sampler(&'s wgpu::Sampler),
}

impl Bound<'_> {
    fn resource(&self) -> wgpu::BindingResource<'_> {
        match self {
            Bound::View(view) => wgpu::BindingResource::TextureView(view),
            Bound::Buffer(buffer) => buffer.as_entire_binding(),
            Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
        }
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn layout_entry(binding: &Binding) -> wgpu::BindGroupLayoutEntry {
    match binding.resource {
        Resource::InputColor | Resource::Texture(_) => texture_entry(binding.binding, true),
        Resource::Depth | Resource::Velocity => texture_entry(binding.binding, false),
        Resource::FrameUniforms | Resource::EffectUniforms => uniform_entry(binding.binding),
        Resource::InputSampler | Resource::TextureSampler => wgpu::BindGroupLayoutEntry {
            binding: binding.binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    }
}

fn fullscreen_pipeline(
    device: &Device,
    label: &str,
    source: &str,
    layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: VERTEX_ENTRY,
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: FRAGMENT_ENTRY,
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

fn linear_sampler(device: &Device, label: &str, mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: mode,
        address_mode_v: mode,
        address_mode_w: mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Draws effect passes on the GPU. Pipelines are built once per program id
/// and reused by every pass that shares it.
pub struct GpuRenderer {
    gpu: Arc<GpuContext>,
    programs: DashMap<ProgramId, Arc<GpuProgram>>,
    stages: DashMap<String, Arc<StagePipeline>>,
    linear_clamp: wgpu::Sampler,
    linear_repeat: wgpu::Sampler,
}

impl GpuRenderer {
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        let linear_clamp = linear_sampler(&gpu.device, "lumen linear clamp", wgpu::AddressMode::ClampToEdge);
        let linear_repeat = linear_sampler(&gpu.device, "lumen linear repeat", wgpu::AddressMode::Repeat);
        Self {
            gpu,
            programs: DashMap::new(),
            stages: DashMap::new(),
            linear_clamp,
            linear_repeat,
        }
    }

    /// A renderer on a fresh headless device.
    pub fn headless() -> Result<Self> {
        Ok(Self::new(Arc::new(GpuContext::init()?)))
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Build every pipeline `pass` needs. Shader or layout errors reported by
    /// the device become `ProgramLink` errors.
    pub fn prepare(&self, pass: &EffectPass) -> LumenResult<()> {
        self.program_for(pass.program())?;
        if let Some(chain) = pass.chain() {
            // presence of the optional buffers only; contents are unused here
            let placeholder = Surface::new(1, 1);
            let ctx = FrameContext {
                depth: Some(&placeholder),
                velocity: Some(&placeholder),
                ..FrameContext::default()
            };
            for stage in chain.gpu_stages(&ctx)? {
                self.stage_pipeline(&stage)?;
            }
        }
        Ok(())
    }

    fn with_validation<T>(&self, label: &str, build: impl FnOnce(&Device) -> T) -> LumenResult<T> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(device);
        match pollster::block_on(device.pop_error_scope()) {
            Some(e) => Err(LumenError::program_link(label, e.to_string())),
            None => Ok(value),
        }
    }

    fn program_for(&self, program: &FusedProgram) -> LumenResult<Arc<GpuProgram>> {
        if let Some(hit) = self.programs.get(&program.id()) {
            return Ok(hit.clone());
        }
        let bindings = program.ir().bindings();
        let groups = bindings.iter().map(|b| b.group + 1).max().unwrap_or(0);
        let built = self.with_validation(program.label(), |device| {
            let layouts: Vec<wgpu::BindGroupLayout> = (0..groups)
                .map(|group| {
                    let entries: Vec<_> = bindings
                        .iter()
                        .filter(|b| b.group == group)
                        .map(layout_entry)
                        .collect();
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(program.label()),
                        entries: &entries,
                    })
                })
                .collect();
            let refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
            let pipeline = fullscreen_pipeline(device, program.label(), program.source(), &refs);
            GpuProgram {
                pipeline,
                layouts,
                bindings: bindings.clone(),
            }
        })?;
        let built = Arc::new(built);
        self.programs.insert(program.id(), built.clone());
        tracing::debug!(program = %program.id(), "built GPU pipeline");
        Ok(built)
    }

    fn stage_pipeline(&self, stage: &GpuStage) -> LumenResult<Arc<StagePipeline>> {
        let key = format!("{}#{}", stage.name, stage.textures.len());
        if let Some(hit) = self.stages.get(&key) {
            return Ok(hit.clone());
        }
        let count = stage.textures.len() as u32;
        let built = self.with_validation(&stage.name, |device| {
            let mut entries: Vec<_> = (0..count).map(|i| texture_entry(i, false)).collect();
            entries.push(uniform_entry(count));
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&stage.name),
                entries: &entries,
            });
            let pipeline = fullscreen_pipeline(device, &stage.name, &stage.source, &[&layout]);
            StagePipeline { pipeline, layout }
        })?;
        let built = Arc::new(built);
        self.stages.insert(key, built.clone());
        Ok(built)
    }

    fn upload(&self, surface: &Surface, format: TextureFormat, label: &str) -> Texture {
        let bytes = if format == DATA_FORMAT {
            bytemuck::cast_slice(&surface.data).to_vec()
        } else {
            surface.to_frame_buffer().data
        };
        self.gpu.device.create_texture_with_data(
            &self.gpu.queue,
            &TextureDescriptor {
                label: Some(label),
                size: Extent3d {
                    width: surface.width,
                    height: surface.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &bytes,
        )
    }

    fn uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn draw(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: &[wgpu::BindGroup],
        target: &wgpu::TextureView,
    ) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            rpass.set_bind_group(index as u32, group, &[]);
        }
        rpass.draw(0..3, 0..1);
    }

    /// Run the pass's chain stages and fused program, then read the result
    /// back into a surface.
    pub fn execute(&self, pass: &EffectPass, input: &Surface, ctx: &FrameContext<'_>) -> LumenResult<Surface> {
        pass.check_inputs(ctx)?;
        let program = self.program_for(pass.program())?;
        let device = &self.gpu.device;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(pass.name()),
        });
        let mut targets = Vec::new();
        let out = self
            .record(&mut encoder, pass, &program, input, ctx, &mut targets)
            .and_then(|()| {
                let last = targets
                    .last()
                    .ok_or_else(|| LumenError::Render("pass rendered nothing".into()))?;
                self.read_back(encoder, last)
            });
        for texture in targets {
            self.gpu.texture_pool.release(texture);
        }
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(LumenError::ContextLost(e.to_string()));
        }
        out
    }

    /// Encode the chain stages and the fused draw. Every render target ends
    /// up in `targets`, the final image last.
    fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &EffectPass,
        program: &GpuProgram,
        input: &Surface,
        ctx: &FrameContext<'_>,
        targets: &mut Vec<Texture>,
    ) -> LumenResult<()> {
        let device = &self.gpu.device;
        let pool = &self.gpu.texture_pool;
        let (width, height) = input.size();
        let input_tex = self.upload(input, TARGET_FORMAT, "lumen input");

        if let Some(chain) = pass.chain() {
            for stage in chain.gpu_stages(ctx)? {
                let pipeline = self.stage_pipeline(&stage)?;
                let mut owned = Vec::with_capacity(stage.textures.len() + 1);
                for texture in &stage.textures {
                    let view = match texture {
                        StageTexture::Input => input_tex.create_view(&Default::default()),
                        StageTexture::Depth => {
                            let depth = ctx.depth.ok_or_else(|| {
                                LumenError::Render(format!("stage '{}' needs a depth buffer", stage.name))
                            })?;
                            self.upload(depth, DATA_FORMAT, "lumen depth")
                                .create_view(&Default::default())
                        }
                        StageTexture::Stage(i) => targets
                            .get(*i)
                            .ok_or_else(|| {
                                LumenError::Render(format!(
                                    "stage '{}' reads output {i} before it was rendered",
                                    stage.name
                                ))
                            })?
                            .create_view(&Default::default()),
                        StageTexture::Lookup(surface) => self
                            .upload(surface, TARGET_FORMAT, "lumen lookup")
                            .create_view(&Default::default()),
                    };
                    owned.push(Bound::View(view));
                }
                owned.push(Bound::Buffer(
                    self.uniform_buffer(&stage.name, bytemuck::cast_slice(&stage.params)),
                ));
                let entries: Vec<wgpu::BindGroupEntry> = owned
                    .iter()
                    .enumerate()
                    .map(|(i, bound)| wgpu::BindGroupEntry {
                        binding: i as u32,
                        resource: bound.resource(),
                    })
                    .collect();
                let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&stage.name),
                    layout: &pipeline.layout,
                    entries: &entries,
                });
                let target = pool.acquire(device, Some(&stage.name), width, height, TARGET_FORMAT, TARGET_USAGE);
                Self::draw(
                    encoder,
                    &stage.name,
                    &pipeline.pipeline,
                    &[group],
                    &target.create_view(&Default::default()),
                );
                targets.push(target);
            }
        }

        let source = targets.last().unwrap_or(&input_tex);
        let frame = FrameUniforms::new(width, height, ctx.time, ctx.frame_index);
        let mut bind_groups = Vec::with_capacity(program.layouts.len());
        for (group, layout) in program.layouts.iter().enumerate() {
            let mut owned = Vec::new();
            for binding in program.bindings.iter().filter(|b| b.group == group as u32) {
                let bound = match binding.resource {
                    Resource::InputColor => Bound::View(source.create_view(&Default::default())),
                    Resource::InputSampler => Bound::Sampler(&self.linear_clamp),
                    Resource::TextureSampler => Bound::Sampler(&self.linear_repeat),
                    Resource::FrameUniforms => {
                        Bound::Buffer(self.uniform_buffer("lumen frame", bytemuck::bytes_of(&frame)))
                    }
                    Resource::EffectUniforms => {
                        Bound::Buffer(self.uniform_buffer("lumen effects", &pass.pack_uniforms()))
                    }
                    Resource::Depth | Resource::Velocity => {
                        let (surface, name) = if binding.resource == Resource::Depth {
                            (ctx.depth, "depth")
                        } else {
                            (ctx.velocity, "velocity")
                        };
                        let surface = surface.ok_or_else(|| {
                            LumenError::Render(format!("pass '{}' needs a {name} buffer", pass.name()))
                        })?;
                        Bound::View(self.upload(surface, DATA_FORMAT, name).create_view(&Default::default()))
                    }
                    Resource::Texture(slot) => {
                        let slot = &pass.program().ir().textures[slot];
                        let surface = pass.texture_for(slot.stage, &slot.local)?;
                        Bound::View(
                            self.upload(&surface, TARGET_FORMAT, &slot.symbol)
                                .create_view(&Default::default()),
                        )
                    }
                };
                owned.push((binding.binding, bound));
            }
            let entries: Vec<wgpu::BindGroupEntry> = owned
                .iter()
                .map(|(binding, bound)| wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: bound.resource(),
                })
                .collect();
            bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pass.name()),
                layout,
                entries: &entries,
            }));
        }

        let target = pool.acquire(device, Some(pass.name()), width, height, TARGET_FORMAT, TARGET_USAGE);
        Self::draw(
            encoder,
            pass.name(),
            &program.pipeline,
            &bind_groups,
            &target.create_view(&Default::default()),
        );
        targets.push(target);
        Ok(())
    }

    fn read_back(&self, mut encoder: wgpu::CommandEncoder, target: &Texture) -> LumenResult<Surface> {
        let size = target.size();
        let (width, height) = (size.width, size.height);
        let padded_bytes_per_row = (width * 4 + 255) & !255;
        let readback = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumen readback"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(LumenError::ContextLost(format!("failed to map output: {e}"))),
            Err(_) => return Err(LumenError::ContextLost("device dropped the readback".into())),
        }

        let data = slice.get_mapped_range();
        let mut surface = Surface::new(width, height);
        for y in 0..height {
            let row_start = (y * padded_bytes_per_row) as usize;
            let src_row = &data[row_start..row_start + (width * 4) as usize];
            for (x, px) in src_row.chunks_exact(4).enumerate() {
                let color = Color::from_rgba8([px[0], px[1], px[2], px[3]]);
                surface.set(x as u32, y, color.to_array());
            }
        }
        drop(data);
        readback.unmap();
        Ok(surface)
    }
}
