//! Indexed, GPU-resident geometry.
//!
//! A [`GeometryBuffer`] is uploaded once and never changes afterwards. Drawables
//! share it through an `Rc`, so one mesh can back any number of entities.

use crate::{
    device::{BufferId, BufferKind, GraphicsDevice, IndexWidth, Topology},
    error::{RenderError, Result},
};

/// Floats per vertex: position (3) followed by texture coordinates (2).
pub const VERTEX_STRIDE: usize = 5;

/// Byte offset of the texture coordinates inside one vertex.
pub const TEXCOORD_OFFSET: usize = 3 * std::mem::size_of::<f32>();

#[derive(Debug)]
pub struct GeometryBuffer {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    topology: Topology,
    index_count: u32,
    index_width: IndexWidth,
    vertex_count: usize,
}

impl GeometryBuffer {
    /// Validates and uploads interleaved vertex data and indices.
    ///
    /// Nothing reaches the device if the vertex array is not a whole number of
    /// vertices or if any index points past the last vertex.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        vertices: &[f32],
        indices: &[u32],
        topology: Topology,
    ) -> Result<Self> {
        if vertices.len() % VERTEX_STRIDE != 0 {
            return Err(RenderError::VertexStride {
                len: vertices.len(),
                stride: VERTEX_STRIDE,
            });
        }
        let vertex_count = vertices.len() / VERTEX_STRIDE;
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= vertex_count)
        {
            return Err(RenderError::IndexOutOfRange {
                index,
                position,
                vertex_count,
            });
        }

        let index_width = IndexWidth::for_vertex_count(vertex_count).max(device.min_index_width());
        let vertex_buffer = device.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(vertices))?;
        let index_buffer = match device.create_buffer(BufferKind::Index, &index_width.encode(indices)) {
            Ok(id) => id,
            Err(e) => {
                device.delete_buffer(vertex_buffer);
                return Err(e);
            }
        };
        log::debug!(
            "uploaded geometry: {vertex_count} vertices, {} {index_width:?} indices",
            indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            topology,
            index_count: indices.len() as u32,
            index_width,
            vertex_count,
        })
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferId {
        self.index_buffer
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_width(&self) -> IndexWidth {
        self.index_width
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Binds both buffers for the next draw.
    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.bind_buffer(BufferKind::Vertex, self.vertex_buffer);
        device.bind_buffer(BufferKind::Index, self.index_buffer);
    }

    /// Frees both device buffers.
    pub fn release(self, device: &mut dyn GraphicsDevice) {
        device.delete_buffer(self.vertex_buffer);
        device.delete_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Call, RecordingDevice};

    fn triangle() -> Vec<f32> {
        vec![
            0.0, 0.0, 0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, 1.0,
        ]
    }

    #[test]
    fn uploads_vertices_and_indices_once() {
        let mut device = RecordingDevice::new();
        let geometry =
            GeometryBuffer::new(&mut device, &triangle(), &[0, 1, 2], Topology::TriangleList).unwrap();

        assert_eq!(geometry.index_count(), 3);
        assert_eq!(geometry.vertex_count(), 3);
        assert_eq!(geometry.index_width(), IndexWidth::U8);
        let creates = device
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::CreateBuffer { .. }))
            .count();
        assert_eq!(creates, 2);
        assert_eq!(device.buffer_contents(geometry.index_buffer()), Some(&[0u8, 1, 2][..]));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut device = RecordingDevice::new();
        let err = GeometryBuffer::new(&mut device, &triangle(), &[0, 1, 3], Topology::TriangleList)
            .unwrap_err();

        assert!(matches!(
            err,
            RenderError::IndexOutOfRange {
                index: 3,
                position: 2,
                vertex_count: 3
            }
        ));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn rejects_partial_vertex() {
        let mut device = RecordingDevice::new();
        let err = GeometryBuffer::new(&mut device, &[0.0; 7], &[], Topology::TriangleStrip).unwrap_err();
        assert!(matches!(err, RenderError::VertexStride { len: 7, stride: 5 }));
    }

    #[test]
    fn index_width_respects_device_minimum() {
        let mut device = RecordingDevice::new().with_min_index_width(IndexWidth::U16);
        let geometry =
            GeometryBuffer::new(&mut device, &triangle(), &[0, 1, 2], Topology::TriangleList).unwrap();

        assert_eq!(geometry.index_width(), IndexWidth::U16);
        assert_eq!(
            device.buffer_contents(geometry.index_buffer()),
            Some(&[0u8, 0, 1, 0, 2, 0][..])
        );
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut device = RecordingDevice::new().with_failing_allocations();
        let err = GeometryBuffer::new(&mut device, &triangle(), &[0, 1, 2], Topology::TriangleList)
            .unwrap_err();
        assert!(matches!(err, RenderError::Allocation(_)));
    }

    #[test]
    fn release_deletes_both_buffers() {
        let mut device = RecordingDevice::new();
        let geometry =
            GeometryBuffer::new(&mut device, &triangle(), &[0, 1, 2], Topology::TriangleList).unwrap();
        assert_eq!(device.live_buffers(), 2);

        geometry.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}
