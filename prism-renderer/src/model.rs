use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use prism_core::collections::SmallVec;
use prism_rhi::{
    Backend, GpuBufferMetaData, IndexFormat, ResourceViewDesc, RhiBuffer, VertexLayout,
};
use crate::engine::LowLevelGraphicsEngine;
use crate::error::{RenderError, RenderResult};
use crate::registry::{BufferHandle, GpuRegistry, ModelHandle, ViewHandle};

/// Vertex format shared by every model and pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, VertexLayout)]
pub struct SkinnedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    #[semantic = "TEXCOORD"]
    pub uv: [f32; 2],
    #[semantic = "BLENDINDICES"]
    pub bone_indices: [u32; 4],
    #[semantic = "BLENDWEIGHT"]
    pub bone_weights: [f32; 4],
}

impl SkinnedVertex {
    /// A vertex bound entirely to bone 0.
    pub fn rigid(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: [1.0, 0.0, 0.0, 1.0],
            uv,
            bone_indices: [0; 4],
            bone_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub normal: Mat4,
}

impl ObjectConstants {
    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            normal: world.inverse().transpose(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse: Vec4,
    /// Specular color in xyz, power in w.
    pub specular: Vec4,
    pub emissive: Vec4,
}

/// One indexed draw of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub material: usize,
}

/// Material parameters. Missing textures fall back to the engine defaults.
#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse_color: Vec4,
    pub specular_color: Vec3,
    pub specular_power: f32,
    pub emissive_color: Vec3,
    pub diffuse: Option<ViewHandle>,
    pub specular: Option<ViewHandle>,
    pub normal: Option<ViewHandle>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "default".to_owned(),
            diffuse_color: Vec4::ONE,
            specular_color: Vec3::splat(0.5),
            specular_power: 32.0,
            emissive_color: Vec3::ZERO,
            diffuse: None,
            specular: None,
            normal: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub constants: BufferHandle,
    pub constants_view: ViewHandle,
    pub diffuse: ViewHandle,
    pub specular: ViewHandle,
    pub normal: ViewHandle,
}

pub struct ModelDesc<'a> {
    pub name: &'a str,
    pub vertices: &'a [SkinnedVertex],
    pub indices: &'a [u32],
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialDesc>,
    pub transform: Mat4,
}

impl ModelDesc<'_> {
    fn validate(&self) -> RenderResult<()> {
        let invalid = |reason: String| RenderError::InvalidModel {
            name: self.name.to_owned(),
            reason,
        };
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(invalid("no geometry".to_owned()));
        }
        if self.meshes.is_empty() {
            return Err(invalid("no meshes".to_owned()));
        }
        for (index, mesh) in self.meshes.iter().enumerate() {
            if mesh.material >= self.materials.len() {
                return Err(invalid(format!(
                    "mesh {index} uses material {} of {}",
                    mesh.material,
                    self.materials.len()
                )));
            }
            let end = mesh.first_index as usize + mesh.index_count as usize;
            if mesh.index_count == 0 || end > self.indices.len() {
                return Err(invalid(format!(
                    "mesh {index} indices {}..{end} exceed {}",
                    mesh.first_index,
                    self.indices.len()
                )));
            }
        }
        Ok(())
    }
}

/// A drawable model. Every GPU object it uses lives in the [`GpuRegistry`].
#[derive(Debug, Clone)]
pub struct GameModel {
    name: String,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_format: IndexFormat,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    transform: Mat4,
    active: bool,
    /// One element per frame in flight.
    object_constants: BufferHandle,
    object_views: SmallVec<[ViewHandle; 4]>,
}

impl GameModel {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    #[inline]
    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Inactive models stay registered but every pass skips them.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    #[inline]
    pub fn object_view(&self, frame_index: u32) -> ViewHandle {
        self.object_views[frame_index as usize]
    }

    /// Write the world transform into the constant buffer element of `frame_index`.
    pub fn write_object_constants<B: Backend>(&self, registry: &GpuRegistry<B>, frame_index: u32) -> RenderResult<()> {
        let buffer = registry.buffer(self.object_constants)?;
        let offset = frame_index as u64 * buffer.meta().stride as u64;
        buffer.write(offset, bytemuck::bytes_of(&ObjectConstants::new(self.transform)))?;
        Ok(())
    }

    pub(crate) fn owned_views(&self) -> impl Iterator<Item = ViewHandle> + '_ {
        self.object_views
            .iter()
            .copied()
            .chain(self.materials.iter().map(|material| material.constants_view))
    }

    pub(crate) fn owned_buffers(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        [self.vertex_buffer, self.index_buffer, self.object_constants]
            .into_iter()
            .chain(self.materials.iter().map(|material| material.constants))
    }
}

impl<B: Backend> LowLevelGraphicsEngine<B> {
    /// Upload the geometry and material constants of a model and register it.
    #[profiling::function]
    pub fn create_model(&mut self, desc: &ModelDesc<'_>) -> RenderResult<ModelHandle> {
        desc.validate()?;

        let frame_count = self.frame_buffer_count();
        let defaults = *self.default_textures();
        let (device, registry) = self.device_and_registry();

        let vertex_buffer = registry.create_buffer(
            device,
            &GpuBufferMetaData::vertex_buffer(
                format!("{} vertices", desc.name),
                SkinnedVertex::stride(),
                desc.vertices.len() as u32,
            ),
        )?;
        let index_buffer = registry.create_buffer(
            device,
            &GpuBufferMetaData::index_buffer(
                format!("{} indices", desc.name),
                IndexFormat::UInt32.byte_size(),
                desc.indices.len() as u32,
            ),
        )?;

        let object_constants = registry.create_buffer(
            device,
            &GpuBufferMetaData::constant_buffer(
                format!("{} object", desc.name),
                std::mem::size_of::<ObjectConstants>() as u32,
                frame_count,
            ),
        )?;
        let object_views = (0..frame_count)
            .map(|frame| {
                registry.create_buffer_view(
                    device,
                    object_constants,
                    &ResourceViewDesc::constant_buffer().with_range(frame, 1),
                )
            })
            .collect::<RenderResult<SmallVec<[ViewHandle; 4]>>>()?;

        let mut materials = Vec::with_capacity(desc.materials.len());
        for material in &desc.materials {
            let constants = registry.create_buffer(
                device,
                &GpuBufferMetaData::constant_buffer(
                    format!("{} material {}", desc.name, material.name),
                    std::mem::size_of::<MaterialConstants>() as u32,
                    1,
                ),
            )?;
            let values = MaterialConstants {
                diffuse: material.diffuse_color,
                specular: material.specular_color.extend(material.specular_power),
                emissive: material.emissive_color.extend(1.0),
            };
            registry.buffer(constants)?.write(0, bytemuck::bytes_of(&values))?;
            let constants_view = registry.create_buffer_view(device, constants, &ResourceViewDesc::constant_buffer())?;

            materials.push(Material {
                constants,
                constants_view,
                diffuse: material.diffuse.unwrap_or(defaults.white),
                specular: material.specular.unwrap_or(defaults.white),
                normal: material.normal.unwrap_or(defaults.flat_normal),
            });
        }

        self.upload_buffer(vertex_buffer, bytemuck::cast_slice(desc.vertices))?;
        self.upload_buffer(index_buffer, bytemuck::cast_slice(desc.indices))?;

        let handle = self.registry_mut().insert_model(GameModel {
            name: desc.name.to_owned(),
            vertex_buffer,
            index_buffer,
            index_format: IndexFormat::UInt32,
            meshes: desc.meshes.clone(),
            materials,
            transform: desc.transform,
            active: true,
            object_constants,
            object_views,
        });
        prism_core::log::debug!("Created model `{}` with {} meshes", desc.name, desc.meshes.len());
        Ok(handle)
    }

    /// Wait for the GPU and free a model. Passes holding the handle skip it from now on.
    pub fn destroy_model(&mut self, handle: ModelHandle) -> RenderResult<()> {
        self.wait_idle()?;
        self.registry_mut()
            .release_model(handle)
            .map(|_| ())
            .ok_or(RenderError::StaleHandle { kind: "model" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skinned_vertex_layout_is_tightly_packed() {
        assert_eq!(SkinnedVertex::stride(), 80);
        let elements = SkinnedVertex::input_elements();
        let semantics: Vec<_> = elements.iter().map(|e| (e.semantic_name, e.offset)).collect();
        assert_eq!(
            semantics,
            [
                ("POSITION", 0),
                ("NORMAL", 12),
                ("TANGENT", 24),
                ("TEXCOORD", 40),
                ("BLENDINDICES", 48),
                ("BLENDWEIGHT", 64),
            ]
        );
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let constants = ObjectConstants::new(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)));
        let normal = constants.normal.transform_vector3(Vec3::X);
        assert!((normal - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn meshes_must_stay_inside_the_index_range() {
        let vertices = [SkinnedVertex::default(); 3];
        let indices = [0, 1, 2];
        let mut desc = ModelDesc {
            name: "triangle",
            vertices: &vertices,
            indices: &indices,
            meshes: vec![Mesh {
                index_count: 3,
                first_index: 1,
                base_vertex: 0,
                material: 0,
            }],
            materials: vec![MaterialDesc::default()],
            transform: Mat4::IDENTITY,
        };
        assert!(matches!(desc.validate(), Err(RenderError::InvalidModel { .. })));

        desc.meshes[0].first_index = 0;
        assert!(desc.validate().is_ok());

        desc.meshes[0].material = 1;
        assert!(desc.validate().is_err());
    }
}
