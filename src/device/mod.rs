//! The graphics device seam.
//!
//! Everything above this module (geometry, programs, drawables, entities and
//! the scene loop) talks to the GPU exclusively through [`GraphicsDevice`].
//! The trait mirrors the classic buffer/program/texture object lifecycle:
//! objects are created, bound, used in an indexed draw and deleted again.
//!
//! Two implementations ship with the crate:
//!
//! - [`gpu::WgpuDevice`] renders for real, either into a window surface or
//!   into an offscreen texture
//! - [`recording::RecordingDevice`] records every call and is used by tests

pub mod recording;
pub mod gpu;

use crate::error::Result;

/// Handle of a device buffer (vertex or index data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle of a compiled shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Handle of a (possibly unlinked) shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Handle of a 2D RGBA texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Location of a vertex attribute inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// Location of a uniform inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
}

/// Width of a single index in an index buffer.
///
/// Ordered from narrow to wide so that `max` picks the wider of two widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// The narrowest width able to address `vertex_count` vertices.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= u8::MAX as usize + 1 {
            IndexWidth::U8
        } else if vertex_count <= u16::MAX as usize + 1 {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }

    /// Packs `indices` into little endian bytes of this width.
    ///
    /// Callers must make sure every index fits; values are truncated otherwise.
    pub fn encode(self, indices: &[u32]) -> Vec<u8> {
        match self {
            IndexWidth::U8 => indices.iter().map(|&i| i as u8).collect(),
            IndexWidth::U16 => {
                let narrowed: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrowed).to_vec()
            }
            IndexWidth::U32 => bytemuck::cast_slice(indices).to_vec(),
        }
    }
}

/// RGBA colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }
}

/// The device operations the rendering core depends on.
///
/// All methods take `&mut self`: a device is driven from a single logical
/// thread, setup first and then once per frame. Binding calls (`bind_*`,
/// `use_program`, `enable_vertex_attrib`, ...) change the current draw state
/// that the next [`draw_elements`](GraphicsDevice::draw_elements) consumes.
/// Nothing about that state is guaranteed to survive a draw call.
pub trait GraphicsDevice {
    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<BufferId>;
    fn bind_buffer(&mut self, kind: BufferKind, buffer: BufferId);
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Compiles a single stage. A failed compilation returns
    /// [`RenderError::Compile`](crate::error::RenderError::Compile) with the
    /// compiler diagnostics.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId>;
    fn delete_shader(&mut self, shader: ShaderId);

    /// Attaches both stages and links them. Always returns a handle; check
    /// [`link_status`](GraphicsDevice::link_status) before using it.
    fn create_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> ProgramId;
    fn link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn use_program(&mut self, program: ProgramId);
    fn delete_program(&mut self, program: ProgramId);

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation>;
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn set_uniform_mat4(&mut self, location: Option<UniformLocation>, value: &[[f32; 4]; 4]);
    fn set_uniform_vec4(&mut self, location: Option<UniformLocation>, value: [f32; 4]);
    fn set_uniform_vec3(&mut self, location: Option<UniformLocation>, value: [f32; 3]);
    fn set_uniform_f32(&mut self, location: Option<UniformLocation>, value: f32);
    fn set_uniform_i32(&mut self, location: Option<UniformLocation>, value: i32);

    fn enable_vertex_attrib(&mut self, location: AttribLocation);
    /// Describes one float attribute: `components` floats starting at
    /// `offset` bytes into each vertex of `stride` bytes.
    fn vertex_attrib_pointer(
        &mut self,
        location: AttribLocation,
        components: u32,
        stride: u32,
        offset: u32,
    );

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId>;
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);
    fn delete_texture(&mut self, texture: TextureId);

    /// Issues an indexed draw with the currently bound program and buffers.
    fn draw_elements(&mut self, topology: Topology, count: u32, width: IndexWidth) -> Result<()>;

    fn set_viewport(&mut self, width: u32, height: u32);
    fn set_clear_color(&mut self, colour: Color);
    fn set_depth_test(&mut self, enabled: bool);
    fn begin_frame(&mut self) -> Result<()>;
    fn end_frame(&mut self) -> Result<()>;

    /// The narrowest index width this device can draw with.
    fn min_index_width(&self) -> IndexWidth {
        IndexWidth::U8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_width_follows_vertex_count() {
        assert_eq!(IndexWidth::for_vertex_count(3), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(256), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(257), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65_536), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65_537), IndexWidth::U32);
    }

    #[test]
    fn wider_width_wins() {
        assert_eq!(IndexWidth::U8.max(IndexWidth::U16), IndexWidth::U16);
        assert_eq!(IndexWidth::U32.max(IndexWidth::U16), IndexWidth::U32);
    }

    #[test]
    fn encode_packs_little_endian() {
        assert_eq!(IndexWidth::U8.encode(&[1, 2, 255]), vec![1, 2, 255]);
        assert_eq!(IndexWidth::U16.encode(&[1, 258]), vec![1, 0, 2, 1]);
        assert_eq!(IndexWidth::U32.encode(&[1]).len(), 4);
    }
}
