//! Render pipeline construction for the wgpu backend.
//!
//! A classic program only fixes the shader stages. wgpu additionally bakes the
//! vertex layout, topology and depth state into the pipeline, so pipelines are
//! built lazily per [`PipelineKey`] the first time a draw needs them.

use std::num::NonZeroU64;

use crate::device::{AttribLocation, ProgramId, Topology};

use super::texture::DepthTexture;

/// Bytes written per draw into the standard uniform block
/// (model, view, projection, colour, params).
pub(crate) const UNIFORM_BLOCK_SIZE: u64 = 3 * 64 + 2 * 16;

/// One float vertex attribute as described through `vertex_attrib_pointer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AttribFormat {
    pub location: AttribLocation,
    pub components: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: ProgramId,
    pub topology: Topology,
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub stride: u32,
    pub attributes: Vec<AttribFormat>,
    pub depth_test: bool,
}

pub(crate) fn uniform_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(UNIFORM_BLOCK_SIZE),
            },
            count: None,
        }],
        label: Some("standard_uniform_bind_group_layout"),
    })
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

pub(crate) fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    key: &PipelineKey,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let attributes: Vec<wgpu::VertexAttribute> = key
        .attributes
        .iter()
        .map(|attrib| wgpu::VertexAttribute {
            offset: attrib.offset as wgpu::BufferAddress,
            shader_location: attrib.location.0,
            format: vertex_format(attrib.components),
        })
        .collect();
    let vertex_layouts = [wgpu::VertexBufferLayout {
        array_stride: key.stride as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &attributes,
    }];
    let topology = match key.topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(&format!("{:?} Render Pipeline", key.program)),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: &vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: key.strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            // parsed meshes carry no reliable winding
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthTexture::FORMAT,
            depth_write_enabled: Some(key.depth_test),
            depth_compare: Some(if key.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            }),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
