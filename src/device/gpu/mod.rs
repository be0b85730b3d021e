//! wgpu implementation of [`GraphicsDevice`].
//!
//! wgpu has no notion of a "current program" or loose uniform locations, so
//! this backend keeps a small draw state that the binding calls mutate. Every
//! [`draw_elements`](GraphicsDevice::draw_elements) snapshots that state into a
//! recorded draw; [`end_frame`](GraphicsDevice::end_frame) uploads all uniform
//! blocks at once and replays the draws in a single render pass.
//!
//! # Shader conventions
//!
//! Programs are WGSL. The vertex stage must export `vs_main`, the fragment
//! stage `fs_main`. Uniforms and attributes are found by name:
//!
//! | name         | kind      | binding                                   |
//! |--------------|-----------|-------------------------------------------|
//! | `u_modelMat` | mat4      | `@group(0) @binding(0)` block, offset 0   |
//! | `u_viewMat`  | mat4      | block, offset 64                          |
//! | `u_projMat`  | mat4      | block, offset 128                         |
//! | `u_col`      | vec4      | block, offset 192                         |
//! | `u_params`   | vec4      | block, offset 208                         |
//! | `u_texture`  | sampler   | `@group(1)` texture (0) + sampler (1)     |
//! | `a_position` | attribute | `@location(0)`                            |
//! | `a_texcoord` | attribute | `@location(1)`                            |
//!
//! A name only resolves if it occurs in the program's source, mirroring how an
//! unused uniform has no location. [`FLAT_SHADER`] follows all of the above.

mod pipeline;
mod texture;

use std::{
    collections::{BTreeMap, HashMap},
    iter,
    sync::Arc,
};

use futures::executor::block_on;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    device::{
        AttribLocation, BufferId, BufferKind, Color, GraphicsDevice, IndexWidth, ProgramId,
        ShaderId, ShaderStage, TextureId, Topology, UniformLocation,
    },
    error::{RenderError, Result},
};

use pipeline::{AttribFormat, PipelineKey, UNIFORM_BLOCK_SIZE};
use texture::{DepthTexture, GpuTexture};

/// Flat colour × texture shader usable as both the vertex and fragment stage.
pub const FLAT_SHADER: &str = include_str!("flat.wgsl");

#[derive(Debug, Clone, Copy)]
enum UniformSlot {
    Block { offset: usize, len: usize },
    Sampler,
}

const UNIFORM_SLOTS: &[(&str, UniformSlot)] = &[
    ("u_modelMat", UniformSlot::Block { offset: 0, len: 64 }),
    ("u_viewMat", UniformSlot::Block { offset: 64, len: 64 }),
    ("u_projMat", UniformSlot::Block { offset: 128, len: 64 }),
    ("u_col", UniformSlot::Block { offset: 192, len: 16 }),
    ("u_params", UniformSlot::Block { offset: 208, len: 16 }),
    ("u_texture", UniformSlot::Sampler),
];

const ATTRIB_SLOTS: &[(&str, u32, u32)] = &[("a_position", 0, 3), ("a_texcoord", 1, 2)];

const INITIAL_DRAW_CAPACITY: usize = 64;

struct CompiledShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    source: String,
}

struct Program {
    vertex: Option<CompiledShader>,
    fragment: Option<CompiledShader>,
    linked: bool,
    log: String,
}

#[derive(Debug, Clone, Copy)]
struct AttribPointer {
    components: u32,
    stride: u32,
    offset: u32,
}

/// Mutable binding state consumed by the next draw.
struct DrawState {
    program: Option<ProgramId>,
    vertex: Option<BufferId>,
    index: Option<BufferId>,
    block: [u8; UNIFORM_BLOCK_SIZE as usize],
    pointers: BTreeMap<u32, AttribPointer>,
    enabled: Vec<u32>,
    texture: Option<TextureId>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            program: None,
            vertex: None,
            index: None,
            block: [0; UNIFORM_BLOCK_SIZE as usize],
            pointers: BTreeMap::new(),
            enabled: Vec::new(),
            texture: None,
        }
    }
}

struct RecordedDraw {
    pipeline: PipelineKey,
    vertex: BufferId,
    index: BufferId,
    format: wgpu::IndexFormat,
    count: u32,
    block: [u8; UNIFORM_BLOCK_SIZE as usize],
    texture: Option<TextureId>,
}

enum Target {
    Surface {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
    Offscreen {
        texture: wgpu::Texture,
        size: [u32; 2],
    },
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    format: wgpu::TextureFormat,
    depth_texture: DepthTexture,
    clear_colour: wgpu::Color,
    depth_test: bool,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    white: GpuTexture,
    uniform_stride: u64,
    uniform_capacity: usize,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,

    next_id: u32,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    shaders: HashMap<ShaderId, CompiledShader>,
    programs: HashMap<ProgramId, Program>,
    textures: HashMap<TextureId, GpuTexture>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    state: DrawState,
    frame: Vec<RecordedDraw>,
    last_frame_draws: usize,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("format", &self.format)
            .field("size", &self.size())
            .field("buffers", &self.buffers.len())
            .field("programs", &self.programs.len())
            .field("textures", &self.textures.len())
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

impl WgpuDevice {
    /// Creates a device presenting to `window`.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("wgpu setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The flat shader outputs linear colour, so prefer an sRGB surface.
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let target = Target::Surface {
            window,
            surface,
            config,
            current: None,
        };
        Ok(Self::from_parts(device, queue, target, format))
    }

    /// Creates a device rendering into an offscreen texture of the given size.
    ///
    /// Used by golden image tests; read the result back with
    /// [`read_pixels`](Self::read_pixels).
    pub async fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::new_without_display_handle());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let size = [width.max(1), height.max(1)];
        let texture = offscreen_texture(&device, size, format);
        Ok(Self::from_parts(
            device,
            queue,
            Target::Offscreen { texture, size },
            format,
        ))
    }

    fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: Target,
        format: wgpu::TextureFormat,
    ) -> Self {
        // Errors outside an error scope are only logged; each fallible call
        // catches its own through `scoped`.
        device.on_uncaptured_error(Arc::new(|e: wgpu::Error| {
            log::error!("wgpu uncaptured error: {e}");
        }));

        let uniform_layout = pipeline::uniform_bind_group_layout(&device);
        let texture_layout = texture::texture_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Drawable Pipeline Layout"),
            bind_group_layouts: &[Some(&uniform_layout), Some(&texture_layout)],
            immediate_size: 0,
        });
        let white = GpuTexture::white(&device, &queue, &texture_layout);

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = UNIFORM_BLOCK_SIZE.div_ceil(alignment) * alignment;
        let uniform_capacity = INITIAL_DRAW_CAPACITY;
        let (uniform_buffer, uniform_bind_group) =
            mk_uniform_buffer(&device, &uniform_layout, uniform_stride, uniform_capacity);

        let size = match &target {
            Target::Surface { config, .. } => [config.width, config.height],
            Target::Offscreen { size, .. } => *size,
        };
        let depth_texture = DepthTexture::new(&device, size, "depth_texture");

        Self {
            device,
            queue,
            target,
            format,
            depth_texture,
            clear_colour: wgpu::Color::BLACK,
            depth_test: true,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            white,
            uniform_stride,
            uniform_capacity,
            uniform_buffer,
            uniform_bind_group,
            next_id: 0,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            state: DrawState::default(),
            frame: Vec::new(),
            last_frame_draws: 0,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        match &self.target {
            Target::Surface { config, .. } => [config.width, config.height],
            Target::Offscreen { size, .. } => *size,
        }
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.target {
            Target::Surface { window, .. } => Some(window),
            Target::Offscreen { .. } => None,
        }
    }

    /// Number of draws submitted by the last completed frame.
    pub fn last_frame_draws(&self) -> usize {
        self.last_frame_draws
    }

    /// Copies the offscreen target into an RGBA image.
    pub async fn read_pixels(&self) -> anyhow::Result<image::RgbaImage> {
        let Target::Offscreen { texture, size } = &self.target else {
            anyhow::bail!("read_pixels needs a headless device");
        };
        let [width, height] = *size;
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let ((), errors) = scoped(&self.device, || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Readback Encoder"),
                });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &output_buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            self.queue.submit(iter::once(encoder.finish()));
        });
        if !errors.is_empty() {
            anyhow::bail!("readback failed: {}", errors.join("\n"));
        }

        // NOTE: the mapping has to be requested before polling, otherwise the
        // receive below never resolves.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.receive()
            .await
            .ok_or_else(|| anyhow::anyhow!("readback channel closed"))??;

        let data = buffer_slice.get_mapped_range();
        let pixels: Vec<u8> = data
            .chunks(padded as usize)
            .flat_map(|row| &row[..unpadded as usize])
            .copied()
            .collect();
        drop(data);
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow::anyhow!("readback buffer has the wrong size"))
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn uniform_slot(location: Option<UniformLocation>) -> Option<UniformSlot> {
        location.and_then(|l| UNIFORM_SLOTS.get(l.0 as usize).map(|(_, slot)| *slot))
    }

    fn write_block(&mut self, location: Option<UniformLocation>, bytes: &[u8]) {
        match Self::uniform_slot(location) {
            Some(UniformSlot::Block { offset, len }) => {
                let n = bytes.len().min(len);
                self.state.block[offset..offset + n].copy_from_slice(&bytes[..n]);
            }
            Some(UniformSlot::Sampler) => {
                log::warn!("float data written to a sampler uniform is ignored");
            }
            None => (),
        }
    }

    /// Attributes from [`ATTRIB_SLOTS`] used by a vertex source, laid out as
    /// the interleaved position + texcoord format.
    fn default_attributes(source: &str) -> Vec<AttribFormat> {
        ATTRIB_SLOTS
            .iter()
            .filter(|(name, _, _)| source.contains(name))
            .map(|&(_, location, components)| AttribFormat {
                location: AttribLocation(location),
                components,
                offset: if location == 0 { 0 } else { 12 },
            })
            .collect()
    }

    fn pipeline_for(&mut self, key: &PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .ok_or(RenderError::UnknownProgram(key.program))?;
        let (Some(vertex), Some(fragment)) = (&program.vertex, &program.fragment) else {
            return Err(RenderError::UnknownProgram(key.program));
        };
        let (render_pipeline, errors) = scoped(&self.device, || {
            pipeline::mk_render_pipeline(
                &self.device,
                &self.pipeline_layout,
                self.format,
                key,
                &vertex.module,
                &fragment.module,
            )
        });
        if !errors.is_empty() {
            return Err(RenderError::Link {
                log: errors.join("\n"),
            });
        }
        log::debug!("created pipeline for {:?} ({:?})", key.program, key.topology);
        self.pipelines.insert(key.clone(), render_pipeline);
        Ok(())
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        let size = [width.max(1), height.max(1)];
        match &mut self.target {
            Target::Surface {
                surface, config, ..
            } => {
                config.width = size[0];
                config.height = size[1];
                surface.configure(&self.device, config);
            }
            Target::Offscreen { texture, size: s } => {
                *texture = offscreen_texture(&self.device, size, self.format);
                *s = size;
            }
        }
        self.depth_texture = DepthTexture::new(&self.device, size, "depth_texture");
    }

    fn ensure_uniform_capacity(&mut self, draws: usize) {
        if draws <= self.uniform_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        log::debug!("growing uniform buffer to {capacity} draws");
        let (buffer, bind_group) = mk_uniform_buffer(
            &self.device,
            &self.uniform_layout,
            self.uniform_stride,
            capacity,
        );
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        self.uniform_capacity = capacity;
    }
}

/// Runs `f` inside out-of-memory and validation error scopes and returns
/// whatever they caught next to its result.
fn scoped<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = validation.pop();
    let out_of_memory = out_of_memory.pop();
    let errors = [block_on(validation), block_on(out_of_memory)]
        .into_iter()
        .flatten()
        .map(|e| e.to_string())
        .collect();
    (value, errors)
}

async fn request_device(adapter: &wgpu::Adapter) -> anyhow::Result<(wgpu::Device, wgpu::Queue)> {
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            // WebGL doesn't support all of wgpu's features.
            required_limits: if cfg!(target_arch = "wasm32") {
                wgpu::Limits::downlevel_webgl2_defaults()
            } else {
                wgpu::Limits::default()
            },
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        })
        .await?;
    Ok((device, queue))
}

fn offscreen_texture(
    device: &wgpu::Device,
    size: [u32; 2],
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Target"),
        size: wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

fn mk_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Standard Uniform Buffer"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE),
            }),
        }],
        label: Some("standard_uniform_bind_group"),
    });
    (buffer, bind_group)
}

fn to_wgpu_color(colour: Color) -> wgpu::Color {
    wgpu::Color {
        r: colour.r,
        g: colour.g,
        b: colour.b,
        a: colour.a,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferId> {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        let (buffer, errors) = scoped(&self.device, || {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{kind:?} Buffer")),
                    contents,
                    usage,
                })
        });
        if !errors.is_empty() {
            return Err(RenderError::Allocation(errors.join("\n")));
        }
        let id = BufferId(self.next());
        log::debug!("created {kind:?} buffer {id:?} ({} bytes)", contents.len());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn bind_buffer(&mut self, kind: BufferKind, buffer: BufferId) {
        match kind {
            BufferKind::Vertex => self.state.vertex = Some(buffer),
            BufferKind::Index => self.state.index = Some(buffer),
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(&buffer) {
            Some(b) => b.destroy(),
            None => log::warn!("deleting unknown buffer {buffer:?}"),
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        let (module, scope_errors) = scoped(&self.device, || {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("{stage:?} Shader")),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
        });
        let info = block_on(module.get_compilation_info());
        let mut log: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        if log.is_empty() {
            log = scope_errors;
        }
        if !log.is_empty() {
            return Err(RenderError::Compile {
                stage,
                log: log.join("\n"),
            });
        }
        let id = ShaderId(self.next());
        self.shaders.insert(
            id,
            CompiledShader {
                stage,
                module,
                source: source.to_string(),
            },
        );
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> ProgramId {
        let id = ProgramId(self.next());
        let copy = |shader: Option<&CompiledShader>| {
            shader.map(|s| CompiledShader {
                stage: s.stage,
                module: s.module.clone(),
                source: s.source.clone(),
            })
        };
        let vs = copy(self.shaders.get(&vertex));
        let fs = copy(self.shaders.get(&fragment));

        let mut problems = Vec::new();
        match &vs {
            Some(s) if s.stage != ShaderStage::Vertex => {
                problems.push(format!("{vertex:?} is not a vertex stage"))
            }
            Some(s) if !s.source.contains("fn vs_main") => {
                problems.push("vertex stage has no `vs_main` entry point".to_string())
            }
            None => problems.push(format!("unknown vertex stage {vertex:?}")),
            _ => (),
        }
        match &fs {
            Some(s) if s.stage != ShaderStage::Fragment => {
                problems.push(format!("{fragment:?} is not a fragment stage"))
            }
            Some(s) if !s.source.contains("fn fs_main") => {
                problems.push("fragment stage has no `fs_main` entry point".to_string())
            }
            None => problems.push(format!("unknown fragment stage {fragment:?}")),
            _ => (),
        }

        let attributes = vs
            .as_ref()
            .map(|s| Self::default_attributes(&s.source))
            .unwrap_or_default();
        self.programs.insert(
            id,
            Program {
                vertex: vs,
                fragment: fs,
                linked: false,
                log: String::new(),
            },
        );

        if problems.is_empty() {
            // Linking is approximated by building the pipeline for the
            // conventional interleaved layout once.
            let probe = PipelineKey {
                program: id,
                topology: Topology::TriangleList,
                strip_index_format: None,
                stride: 20,
                attributes,
                depth_test: self.depth_test,
            };
            if let Err(e) = self.pipeline_for(&probe) {
                problems.push(e.to_string());
            }
        }

        if let Some(program) = self.programs.get_mut(&id) {
            program.linked = problems.is_empty();
            program.log = problems.join("\n");
        }
        id
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_else(|| format!("unknown program {program:?}"))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let source = &self.programs.get(&program)?.vertex.as_ref()?.source;
        ATTRIB_SLOTS
            .iter()
            .find(|(slot, _, _)| *slot == name && source.contains(name))
            .map(|&(_, location, _)| AttribLocation(location))
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        let used = |s: &Option<CompiledShader>| s.as_ref().is_some_and(|s| s.source.contains(name));
        if !used(&program.vertex) && !used(&program.fragment) {
            return None;
        }
        UNIFORM_SLOTS
            .iter()
            .position(|(slot, _)| *slot == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn set_uniform_mat4(&mut self, location: Option<UniformLocation>, value: &[[f32; 4]; 4]) {
        self.write_block(location, bytemuck::cast_slice(value));
    }

    fn set_uniform_vec4(&mut self, location: Option<UniformLocation>, value: [f32; 4]) {
        self.write_block(location, bytemuck::cast_slice(&value));
    }

    fn set_uniform_vec3(&mut self, location: Option<UniformLocation>, value: [f32; 3]) {
        self.write_block(location, bytemuck::cast_slice(&value));
    }

    fn set_uniform_f32(&mut self, location: Option<UniformLocation>, value: f32) {
        self.write_block(location, bytemuck::bytes_of(&value));
    }

    fn set_uniform_i32(&mut self, location: Option<UniformLocation>, value: i32) {
        match Self::uniform_slot(location) {
            Some(UniformSlot::Sampler) if value != 0 => {
                log::warn!("only texture unit 0 is available, sampler set to {value}");
            }
            Some(UniformSlot::Sampler) | None => (),
            Some(UniformSlot::Block { .. }) => self.write_block(location, bytemuck::bytes_of(&value)),
        }
    }

    fn enable_vertex_attrib(&mut self, location: AttribLocation) {
        if !self.state.enabled.contains(&location.0) {
            self.state.enabled.push(location.0);
        }
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: AttribLocation,
        components: u32,
        stride: u32,
        offset: u32,
    ) {
        self.state.pointers.insert(
            location.0,
            AttribPointer {
                components,
                stride,
                offset,
            },
        );
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId> {
        if rgba.len() != (width as usize) * (height as usize) * 4 {
            return Err(RenderError::Texture(format!(
                "expected {} bytes for a {width}x{height} RGBA texture, got {}",
                width as usize * height as usize * 4,
                rgba.len()
            )));
        }
        let id = TextureId(self.next());
        let (texture, errors) = scoped(&self.device, || {
            GpuTexture::from_rgba(
                &self.device,
                &self.queue,
                &self.texture_layout,
                width,
                height,
                rgba,
                &format!("{id:?}"),
            )
        });
        if !errors.is_empty() {
            return Err(RenderError::Allocation(errors.join("\n")));
        }
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        if unit != 0 {
            log::warn!("texture unit {unit} is not available, binding ignored");
            return;
        }
        self.state.texture = texture;
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("deleting unknown texture {texture:?}");
        }
    }

    fn draw_elements(&mut self, topology: Topology, count: u32, width: IndexWidth) -> Result<()> {
        let format = match width {
            IndexWidth::U16 => wgpu::IndexFormat::Uint16,
            IndexWidth::U32 => wgpu::IndexFormat::Uint32,
            IndexWidth::U8 => {
                return Err(RenderError::Unsupported("8-bit indices".to_string()));
            }
        };
        let program = self
            .state
            .program
            .ok_or_else(|| RenderError::Unsupported("draw without a program in use".to_string()))?;
        if !self.link_status(program) {
            return Err(RenderError::Link {
                log: self.program_info_log(program),
            });
        }
        let vertex = self
            .state
            .vertex
            .ok_or_else(|| RenderError::Unsupported("draw without a vertex buffer".to_string()))?;
        let index = self
            .state
            .index
            .ok_or_else(|| RenderError::Unsupported("draw without an index buffer".to_string()))?;
        if !self.buffers.contains_key(&vertex) {
            return Err(RenderError::UnknownBuffer(vertex));
        }
        if !self.buffers.contains_key(&index) {
            return Err(RenderError::UnknownBuffer(index));
        }

        let mut stride = None;
        let attributes = self
            .state
            .enabled
            .iter()
            .filter_map(|location| {
                let pointer = self.state.pointers.get(location)?;
                stride.get_or_insert(pointer.stride);
                Some(AttribFormat {
                    location: AttribLocation(*location),
                    components: pointer.components,
                    offset: pointer.offset,
                })
            })
            .collect();
        let key = PipelineKey {
            program,
            topology,
            strip_index_format: match topology {
                Topology::TriangleStrip => Some(format),
                Topology::TriangleList => None,
            },
            stride: stride.unwrap_or(0),
            attributes,
            depth_test: self.depth_test,
        };
        self.pipeline_for(&key)?;

        self.frame.push(RecordedDraw {
            pipeline: key,
            vertex,
            index,
            format,
            count,
            block: self.state.block,
            texture: self.state.texture,
        });
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        if self.size() != [width, height] && width > 0 && height > 0 {
            self.resize_target(width, height);
        }
    }

    fn set_clear_color(&mut self, colour: Color) {
        self.clear_colour = to_wgpu_color(colour);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.frame.clear();
        self.state = DrawState::default();
        if let Target::Surface {
            window,
            surface,
            config,
            current,
        } = &mut self.target
        {
            match surface.get_current_texture() {
                wgpu::CurrentSurfaceTexture::Success(texture) => *current = Some(texture),
                wgpu::CurrentSurfaceTexture::Suboptimal(texture) => {
                    surface.configure(&self.device, config);
                    *current = Some(texture);
                }
                wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                    let size = window.inner_size();
                    config.width = size.width.max(1);
                    config.height = size.height.max(1);
                    surface.configure(&self.device, config);
                    return Err(RenderError::Surface("surface lost, reconfigured".to_string()));
                }
                wgpu::CurrentSurfaceTexture::Timeout => {
                    return Err(RenderError::Surface("timed out acquiring a frame".to_string()));
                }
                wgpu::CurrentSurfaceTexture::Occluded => {
                    return Err(RenderError::Surface("window is occluded".to_string()));
                }
                wgpu::CurrentSurfaceTexture::Validation => {
                    return Err(RenderError::Surface(
                        "validation error acquiring a frame".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        let frame = std::mem::take(&mut self.frame);
        self.ensure_uniform_capacity(frame.len());

        let stride = self.uniform_stride as usize;
        let mut blocks = vec![0u8; stride * frame.len()];
        for (i, draw) in frame.iter().enumerate() {
            blocks[i * stride..i * stride + draw.block.len()].copy_from_slice(&draw.block);
        }
        if !blocks.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &blocks);
        }

        let surface_texture = match &mut self.target {
            Target::Surface { current, .. } => Some(current.take().ok_or_else(|| {
                RenderError::Surface("end_frame without a successful begin_frame".to_string())
            })?),
            Target::Offscreen { .. } => None,
        };
        let view = match (&surface_texture, &self.target) {
            (Some(output), _) => output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            (None, Target::Offscreen { texture, .. }) => {
                texture.create_view(&wgpu::TextureViewDescriptor::default())
            }
            (None, Target::Surface { .. }) => {
                return Err(RenderError::Surface("no surface texture acquired".to_string()));
            }
        };

        let ((), errors) = scoped(&self.device, || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Render Encoder"),
                });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(self.clear_colour),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &self.depth_texture.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });

                for (i, draw) in frame.iter().enumerate() {
                    let (Some(pipeline), Some(vertex), Some(index)) = (
                        self.pipelines.get(&draw.pipeline),
                        self.buffers.get(&draw.vertex),
                        self.buffers.get(&draw.index),
                    ) else {
                        log::warn!("skipping a draw whose resources were released mid-frame");
                        continue;
                    };
                    let texture = draw
                        .texture
                        .and_then(|id| self.textures.get(&id))
                        .unwrap_or(&self.white);
                    render_pass.set_pipeline(pipeline);
                    render_pass.set_bind_group(
                        0,
                        &self.uniform_bind_group,
                        &[(i * stride) as wgpu::DynamicOffset],
                    );
                    render_pass.set_bind_group(1, &texture.bind_group, &[]);
                    render_pass.set_vertex_buffer(0, vertex.slice(..));
                    render_pass.set_index_buffer(index.slice(..), draw.format);
                    render_pass.draw_indexed(0..draw.count, 0, 0..1);
                }
            }
            self.queue.submit(iter::once(encoder.finish()));
        });
        if let Some(output) = surface_texture {
            output.present();
        }
        if !errors.is_empty() {
            return Err(RenderError::Frame(errors.join("\n")));
        }
        self.last_frame_draws = frame.len();
        Ok(())
    }

    fn min_index_width(&self) -> IndexWidth {
        IndexWidth::U16
    }
}

#[cfg(all(test, feature = "integration-tests"))]
mod tests {
    use super::*;

    fn headless() -> WgpuDevice {
        block_on(WgpuDevice::headless(8, 8)).unwrap()
    }

    #[test]
    fn earlier_stray_error_does_not_fail_later_allocations() {
        let mut device = headless();
        // empty usage is a validation error raised outside any scope
        let _invalid = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("invalid"),
            size: 4,
            usage: wgpu::BufferUsages::empty(),
            mapped_at_creation: false,
        });

        let buffer = device.create_buffer(BufferKind::Vertex, &[0; 16]);
        assert!(buffer.is_ok(), "{buffer:?}");
        let texture = device.create_texture(1, 1, &[255; 4]);
        assert!(texture.is_ok(), "{texture:?}");
    }

    #[test]
    fn invalid_wgsl_is_a_compile_error() {
        let mut device = headless();
        let result = device.compile_shader(ShaderStage::Vertex, "fn vs_main( {");
        assert!(matches!(result, Err(RenderError::Compile { .. })));
        assert!(device.create_buffer(BufferKind::Index, &[0; 4]).is_ok());
    }
}
