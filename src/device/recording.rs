//! A [`GraphicsDevice`] that records calls instead of talking to a GPU.
//!
//! Used by the unit and integration tests to check which device calls the
//! core issues and in which order. Handles are plain counters; buffers and
//! textures keep their uploaded bytes so tests can inspect them.

use std::collections::HashMap;

use crate::{
    device::{
        AttribLocation, BufferId, BufferKind, Color, GraphicsDevice, IndexWidth, ProgramId,
        ShaderId, ShaderStage, TextureId, Topology, UniformLocation,
    },
    error::{RenderError, Result},
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer { kind: BufferKind, id: BufferId, len: usize },
    BindBuffer { kind: BufferKind, id: BufferId },
    DeleteBuffer(BufferId),
    CompileShader { stage: ShaderStage, id: ShaderId },
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    UseProgram(ProgramId),
    DeleteProgram(ProgramId),
    UniformMat4 { location: Option<UniformLocation>, value: [[f32; 4]; 4] },
    UniformVec4 { location: Option<UniformLocation>, value: [f32; 4] },
    UniformVec3 { location: Option<UniformLocation>, value: [f32; 3] },
    UniformF32 { location: Option<UniformLocation>, value: f32 },
    UniformI32 { location: Option<UniformLocation>, value: i32 },
    EnableVertexAttrib(AttribLocation),
    VertexAttribPointer { location: AttribLocation, components: u32, stride: u32, offset: u32 },
    CreateTexture { id: TextureId, width: u32, height: u32 },
    BindTexture { unit: u32, texture: Option<TextureId> },
    DeleteTexture(TextureId),
    DrawElements { topology: Topology, count: u32, width: IndexWidth },
    Viewport { width: u32, height: u32 },
    ClearColor(Color),
    DepthTest(bool),
    BeginFrame,
    EndFrame,
}

#[derive(Debug, Default)]
struct RecordedProgram {
    linked: bool,
    attribs: HashMap<String, AttribLocation>,
    uniforms: HashMap<String, UniformLocation>,
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Vec<Call>,
    next_id: u32,
    buffers: HashMap<BufferId, (BufferKind, Vec<u8>)>,
    textures: HashMap<TextureId, (u32, u32)>,
    shaders: HashMap<ShaderId, ShaderStage>,
    programs: HashMap<ProgramId, RecordedProgram>,
    uniform_names: HashMap<UniformLocation, String>,
    next_location: u32,
    fail_links: bool,
    fail_allocations: bool,
    min_index_width: Option<IndexWidth>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every program created from now on fails to link.
    pub fn with_failing_links(mut self) -> Self {
        self.fail_links = true;
        self
    }

    /// Every buffer or texture allocation fails.
    pub fn with_failing_allocations(mut self) -> Self {
        self.fail_allocations = true;
        self
    }

    /// Pretends the device cannot draw with indices narrower than `width`.
    pub fn with_min_index_width(mut self, width: IndexWidth) -> Self {
        self.min_index_width = Some(width);
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// All indexed draws recorded so far.
    pub fn draws(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::DrawElements { .. }))
            .collect()
    }

    /// Name under which `location` was looked up, if it was handed out by this device.
    pub fn uniform_name(&self, location: UniformLocation) -> Option<&str> {
        self.uniform_names.get(&location).map(String::as_str)
    }

    /// Names of the uniforms written since the last `clear_calls`, in call order.
    pub fn uniforms_set(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::UniformMat4 { location, .. }
                | Call::UniformVec4 { location, .. }
                | Call::UniformVec3 { location, .. }
                | Call::UniformF32 { location, .. }
                | Call::UniformI32 { location, .. } => *location,
                _ => None,
            })
            .filter_map(|location| self.uniform_name(location))
            .collect()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|(_, bytes)| bytes.as_slice())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferId> {
        if self.fail_allocations {
            return Err(RenderError::Allocation(format!("{kind:?} buffer of {} bytes", contents.len())));
        }
        let id = BufferId(self.next());
        self.buffers.insert(id, (kind, contents.to_vec()));
        self.calls.push(Call::CreateBuffer { kind, id, len: contents.len() });
        Ok(id)
    }

    fn bind_buffer(&mut self, kind: BufferKind, id: BufferId) {
        self.calls.push(Call::BindBuffer { kind, id });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.calls.push(Call::DeleteBuffer(buffer));
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId> {
        if source.trim().is_empty() {
            return Err(RenderError::Compile {
                stage,
                log: "empty shader source".to_string(),
            });
        }
        let id = ShaderId(self.next());
        self.shaders.insert(id, stage);
        self.calls.push(Call::CompileShader { stage, id });
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.calls.push(Call::DeleteShader(shader));
    }

    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> ProgramId {
        let id = ProgramId(self.next());
        let linked = !self.fail_links
            && self.shaders.get(&vertex) == Some(&ShaderStage::Vertex)
            && self.shaders.get(&fragment) == Some(&ShaderStage::Fragment);
        self.programs.insert(
            id,
            RecordedProgram {
                linked,
                ..Default::default()
            },
        );
        self.calls.push(Call::CreateProgram(id));
        id
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        match self.programs.get(&program) {
            Some(p) if p.linked => String::new(),
            Some(_) => "recording device: link rejected".to_string(),
            None => format!("unknown program {program:?}"),
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(Call::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(Call::DeleteProgram(program));
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let p = self.programs.get_mut(&program).filter(|p| p.linked)?;
        let next = p.attribs.len() as u32;
        Some(*p.attribs.entry(name.to_string()).or_insert(AttribLocation(next)))
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get_mut(&program).filter(|p| p.linked)?;
        if let Some(location) = p.uniforms.get(name) {
            return Some(*location);
        }
        self.next_location += 1;
        let location = UniformLocation(self.next_location);
        p.uniforms.insert(name.to_string(), location);
        self.uniform_names.insert(location, name.to_string());
        Some(location)
    }

    fn set_uniform_mat4(&mut self, location: Option<UniformLocation>, value: &[[f32; 4]; 4]) {
        self.calls.push(Call::UniformMat4 { location, value: *value });
    }

    fn set_uniform_vec4(&mut self, location: Option<UniformLocation>, value: [f32; 4]) {
        self.calls.push(Call::UniformVec4 { location, value });
    }

    fn set_uniform_vec3(&mut self, location: Option<UniformLocation>, value: [f32; 3]) {
        self.calls.push(Call::UniformVec3 { location, value });
    }

    fn set_uniform_f32(&mut self, location: Option<UniformLocation>, value: f32) {
        self.calls.push(Call::UniformF32 { location, value });
    }

    fn set_uniform_i32(&mut self, location: Option<UniformLocation>, value: i32) {
        self.calls.push(Call::UniformI32 { location, value });
    }

    fn enable_vertex_attrib(&mut self, location: AttribLocation) {
        self.calls.push(Call::EnableVertexAttrib(location));
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: AttribLocation,
        components: u32,
        stride: u32,
        offset: u32,
    ) {
        self.calls.push(Call::VertexAttribPointer {
            location,
            components,
            stride,
            offset,
        });
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId> {
        if self.fail_allocations {
            return Err(RenderError::Allocation(format!("{width}x{height} texture")));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(RenderError::Texture(format!(
                "expected {expected} bytes for a {width}x{height} RGBA texture, got {}",
                rgba.len()
            )));
        }
        let id = TextureId(self.next());
        self.textures.insert(id, (width, height));
        self.calls.push(Call::CreateTexture { id, width, height });
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(Call::BindTexture { unit, texture });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn draw_elements(&mut self, topology: Topology, count: u32, width: IndexWidth) -> Result<()> {
        self.calls.push(Call::DrawElements { topology, count, width });
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.calls.push(Call::Viewport { width, height });
    }

    fn set_clear_color(&mut self, colour: Color) {
        self.calls.push(Call::ClearColor(colour));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.calls.push(Call::DepthTest(enabled));
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn min_index_width(&self) -> IndexWidth {
        self.min_index_width.unwrap_or(IndexWidth::U8)
    }
}
