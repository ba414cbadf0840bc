//! Per-frame data exchanged with collaborators
//!
//! These are the types crossing the renderer's boundary each frame: mesh and
//! material references owned by the asset collaborator, the renderable list
//! rebuilt every frame by the scene collaborator, camera matrices, and the
//! UI overlay hook.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;

/// Interleaved vertex format consumed by the forward pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Binding description for the single interleaved vertex buffer
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions: position, normal, uv
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// GPU handles describing one drawable mesh
///
/// Owned by the asset collaborator; the renderer only reads it. A mesh whose
/// buffers are still null (upload pending or failed) is skipped as a soft
/// failure, and a `None` material set means "not yet bound" — drawn without
/// a material rather than aborting the frame.
#[derive(Debug, Clone, Copy)]
pub struct MeshBinding {
    /// Vertex buffer handle, may be null while upload is pending
    pub vertex_buffer: vk::Buffer,
    /// Byte offset of this mesh inside the vertex buffer
    pub vertex_offset: vk::DeviceSize,
    /// Index buffer handle, may be null while upload is pending
    pub index_buffer: vk::Buffer,
    /// Byte offset of this mesh inside the index buffer
    pub index_offset: vk::DeviceSize,
    /// Number of u32 indices to draw
    pub index_count: u32,
    /// Material descriptor set, `None` when the material is not yet bound
    pub material_set: Option<vk::DescriptorSet>,
}

impl MeshBinding {
    /// Whether every GPU handle needed for drawing is present
    pub fn is_complete(&self) -> bool {
        self.vertex_buffer != vk::Buffer::null()
            && self.index_buffer != vk::Buffer::null()
            && self.index_count > 0
    }
}

/// One entry of the per-frame renderable list
///
/// Ephemeral: the scene collaborator rebuilds the list every frame and the
/// renderer never stores it.
#[derive(Debug, Clone, Copy)]
pub struct Renderable<'a> {
    /// Mesh to draw
    pub mesh: &'a MeshBinding,
    /// World transform (model matrix)
    pub transform: &'a Matrix4<f32>,
}

/// View and projection provided by the active camera
#[derive(Debug, Clone)]
pub struct CameraMatrices {
    /// World-to-view transform
    pub view: Matrix4<f32>,
    /// View-to-clip transform
    pub projection: Matrix4<f32>,
}

/// Hook for the UI collaborator to append draw commands
///
/// Called exactly once per frame, inside the open render pass, after all
/// scene renderables have been recorded.
pub trait OverlayRenderer {
    /// Record overlay draw commands into the frame's command buffer
    fn record(&mut self, command_buffer: vk::CommandBuffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn null_handles_make_a_mesh_incomplete() {
        let mut mesh = MeshBinding {
            vertex_buffer: vk::Buffer::null(),
            vertex_offset: 0,
            index_buffer: vk::Buffer::null(),
            index_offset: 0,
            index_count: 36,
            material_set: None,
        };
        assert!(!mesh.is_complete());

        mesh.vertex_buffer = vk::Buffer::from_raw(1);
        assert!(!mesh.is_complete());

        mesh.index_buffer = vk::Buffer::from_raw(2);
        assert!(mesh.is_complete());

        mesh.index_count = 0;
        assert!(!mesh.is_complete());
    }
}
