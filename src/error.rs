//! Error types of the rendering core.
//!
//! Setup code (shader compilation, program linking, geometry upload) reports
//! [`RenderError`]. Application-facing entry points such as [`crate::flow::run`]
//! wrap these in `anyhow::Error`.

use crate::device::{BufferId, ProgramId, ShaderStage, TextureId};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{stage:?} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link: {log}")]
    Link { log: String },
    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
    #[error("vertex array of length {len} is not a multiple of the {stride}-float stride")]
    VertexStride { len: usize, stride: usize },
    #[error("device allocation failed: {0}")]
    Allocation(String),
    #[error("unknown buffer handle {0:?}")]
    UnknownBuffer(BufferId),
    #[error("unknown program handle {0:?}")]
    UnknownProgram(ProgramId),
    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureId),
    #[error("unsupported by this device: {0}")]
    Unsupported(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("frame submission failed: {0}")]
    Frame(String),
    #[error("texture error: {0}")]
    Texture(String),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
