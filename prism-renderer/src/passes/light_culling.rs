use prism_core::collections::SmallVec;
use prism_core::log::debug;
use prism_rhi::{
    Backend, CommandListType, ComputePipelineState, Extent2D, GpuBufferMetaData, PushConstantRange,
    ResourceLayoutDesc, ResourceLayoutElement, ResourceState, ResourceViewDesc, RhiCommandList, RhiDevice,
    ShaderType, ShaderVisibility,
};
use crate::engine::{FrameRecorder, LowLevelGraphicsEngine};
use crate::error::{RenderError, RenderResult};
use crate::passes::{PerFrame, ZPrepass};
use crate::registry::{BufferHandle, GpuRegistry, LayoutHandle, ViewHandle};
use crate::scene::SceneBuffers;
use crate::shader::ShaderLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullingLightType {
    Point,
    Spot,
}

impl CullingLightType {
    pub const COUNT: usize = 2;
    pub const ALL: [CullingLightType; Self::COUNT] = [CullingLightType::Point, CullingLightType::Spot];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CullingLightType::Point => "point",
            CullingLightType::Spot => "spot",
        }
    }
}

/// Tiles covering `extent`, partial tiles at the right and bottom edges included.
#[inline]
pub fn tile_count(extent: Extent2D, tile_size: u32) -> (u32, u32) {
    (extent.width.div_ceil(tile_size), extent.height.div_ceil(tile_size))
}

/// Tiles in x, tiles in y, tile size, point slots per tile, spot slots per tile.
pub const TILE_CONSTANT_COUNT: usize = 5;

#[derive(Debug, Clone, Copy)]
struct IndexBuffers {
    extent: Extent2D,
    light_counts: [u32; CullingLightType::COUNT],
    buffers: [BufferHandle; CullingLightType::COUNT],
    unordered_views: [ViewHandle; CullingLightType::COUNT],
    shader_views: [ViewHandle; CullingLightType::COUNT],
}

/// Tile based light culling on the compute queue.
///
/// Reads the z prepass depth of the frame and writes, per light type, `light count` slots of
/// `u32` light indices for every screen tile.
pub struct LightCulling<B: Backend> {
    layout: LayoutHandle,
    pipeline: ComputePipelineState<B>,
    tile_size: u32,
    depth_views: PerFrame<ViewHandle>,
    depth_extent: Extent2D,
    index_buffers: Option<IndexBuffers>,
}

impl<B: Backend> LightCulling<B> {
    pub const NAME: &'static str = "light culling";
    /// Scene constants, light constants and depth come before the index buffers.
    pub const FIXED_BINDINGS: u32 = 3;

    #[profiling::function]
    pub fn new(
        engine: &mut LowLevelGraphicsEngine<B>,
        shaders: &mut ShaderLibrary,
        zprepass: &ZPrepass<B>,
    ) -> RenderResult<Self> {
        let tile_size = engine.tile_size();
        let (device, registry) = engine.device_and_registry();

        let mut desc = ResourceLayoutDesc::compute(Self::NAME)
            .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::Compute))
            .with_element(ResourceLayoutElement::constant_buffer(1, 0, ShaderVisibility::Compute))
            .with_element(ResourceLayoutElement::texture(0, 0, ShaderVisibility::Compute));
        for light_type in CullingLightType::ALL {
            debug_assert_eq!(desc.elements.len() as u32, Self::FIXED_BINDINGS + light_type.index() as u32);
            desc = desc.with_element(ResourceLayoutElement::rw_buffer(
                light_type.index() as u32,
                0,
                ShaderVisibility::Compute,
            ));
        }
        let layout = registry.create_layout(
            device,
            &desc.with_constants(PushConstantRange {
                shader_register: 2,
                register_space: 0,
                visibility: ShaderVisibility::Compute,
                count: TILE_CONSTANT_COUNT as u32,
            }),
        )?;

        let mut pipeline = device.create_compute_pipeline_state(registry.layout(layout)?.clone());
        pipeline.set_name(Self::NAME)?;
        pipeline.set_compute_shader(shaders.load::<B>(device, ShaderType::Compute, "light_culling.hlsl", "CSMain")?)?;
        pipeline.complete_setting(device)?;

        let mut culling = Self {
            layout,
            pipeline,
            tile_size,
            depth_views: PerFrame::new(),
            depth_extent: Extent2D::default(),
            index_buffers: None,
        };
        culling.set_depth_input(zprepass);
        Ok(culling)
    }

    /// Read depth from `zprepass`. Index buffers follow its size on the next `prepare_buffer`.
    pub fn set_depth_input(&mut self, zprepass: &ZPrepass<B>) {
        self.depth_views = zprepass.depth_views();
        self.depth_extent = zprepass.extent();
    }

    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[inline]
    pub fn tile_count(&self) -> (u32, u32) {
        tile_count(self.depth_extent, self.tile_size)
    }

    /// Index slots per tile of `light_type`, zero before the first `prepare_buffer`.
    pub fn light_capacity(&self, light_type: CullingLightType) -> u32 {
        self.index_buffers
            .as_ref()
            .map_or(0, |buffers| buffers.light_counts[light_type.index()])
    }

    pub fn index_buffer(&self, light_type: CullingLightType) -> Option<BufferHandle> {
        self.index_buffers.as_ref().map(|buffers| buffers.buffers[light_type.index()])
    }

    /// View the shading passes read the indices of `light_type` through.
    pub fn index_view(&self, light_type: CullingLightType) -> Option<ViewHandle> {
        self.index_buffers.as_ref().map(|buffers| buffers.shader_views[light_type.index()])
    }

    /// Size the index buffers for `light count × tile count` entries per light type. Buffers are
    /// recreated when the counts or the depth size changed. Returns whether they were recreated.
    #[profiling::function]
    pub fn prepare_buffer(
        &mut self,
        engine: &mut LowLevelGraphicsEngine<B>,
        point_light_count: u32,
        spot_light_count: u32,
    ) -> RenderResult<bool> {
        debug_assert!(point_light_count > 0, "light culling needs at least one point light slot");
        debug_assert!(spot_light_count > 0, "light culling needs at least one spot light slot");
        let light_counts = [point_light_count.max(1), spot_light_count.max(1)];

        if let Some(current) = &self.index_buffers {
            if current.light_counts == light_counts && current.extent == self.depth_extent {
                return Ok(false);
            }
            engine.wait_idle()?;
        }

        let (tiles_x, tiles_y) = self.tile_count();
        let (device, registry) = engine.device_and_registry();
        self.release_buffers(registry);

        let mut buffers = [BufferHandle::default(); CullingLightType::COUNT];
        let mut unordered_views = [ViewHandle::default(); CullingLightType::COUNT];
        let mut shader_views = [ViewHandle::default(); CullingLightType::COUNT];
        for light_type in CullingLightType::ALL {
            let index = light_type.index();
            let buffer = registry.create_buffer(
                device,
                &GpuBufferMetaData::unordered_access_buffer(
                    format!("{} {} indices", Self::NAME, light_type.name()),
                    std::mem::size_of::<u32>() as u32,
                    light_counts[index] * tiles_x * tiles_y,
                ),
            )?;
            buffers[index] = buffer;
            unordered_views[index] = registry.create_buffer_view(device, buffer, &ResourceViewDesc::unordered_access())?;
            shader_views[index] = registry.create_buffer_view(device, buffer, &ResourceViewDesc::shader_resource())?;
        }

        debug!(
            "Light index buffers for {}x{} tiles, {} point and {} spot slots per tile",
            tiles_x, tiles_y, light_counts[0], light_counts[1]
        );
        self.index_buffers = Some(IndexBuffers {
            extent: self.depth_extent,
            light_counts,
            buffers,
            unordered_views,
            shader_views,
        });
        Ok(true)
    }

    fn release_buffers(&mut self, registry: &mut GpuRegistry<B>) {
        if let Some(old) = self.index_buffers.take() {
            for view in old.unordered_views.into_iter().chain(old.shader_views) {
                registry.remove_view(view);
            }
            for buffer in old.buffers {
                registry.remove_buffer(buffer);
            }
        }
    }

    fn prepared(&self) -> RenderResult<&IndexBuffers> {
        self.index_buffers.as_ref().ok_or(RenderError::Unprepared("light index buffers"))
    }

    /// Push constants shared with the shading passes reading the index buffers.
    pub fn tile_constants(&self) -> RenderResult<[u32; TILE_CONSTANT_COUNT]> {
        let buffers = self.prepared()?;
        let (tiles_x, tiles_y) = self.tile_count();
        Ok([tiles_x, tiles_y, self.tile_size, buffers.light_counts[0], buffers.light_counts[1]])
    }

    /// Dispatch one thread group per tile on the compute list of the current frame.
    #[profiling::function]
    pub fn draw(&self, engine: &mut LowLevelGraphicsEngine<B>, scene: &SceneBuffers) -> RenderResult<()> {
        let buffers = self.prepared()?;
        let constants = self.tile_constants()?;
        let FrameRecorder {
            list,
            registry,
            frame_index,
        } = engine.recorder(CommandListType::Compute)?;
        let layout = registry.layout(self.layout)?;

        let mut views = SmallVec::<[ViewHandle; 5]>::new();
        views.push(scene.scene_view(frame_index));
        views.push(scene.light_view(frame_index));
        views.push(self.depth_views[frame_index as usize]);
        views.extend(buffers.unordered_views);

        list.set_compute_pipeline(&self.pipeline)?;
        list.bind_compute_resources(layout, &registry.views(&views)?)?;
        list.push_compute_constants(layout, &constants)?;
        list.dispatch(constants[0], constants[1], 1)?;
        Ok(())
    }

    /// Move the index buffers between compute writes and shading reads on `list`.
    pub fn transition_indices(
        &self,
        list: &mut B::CommandList,
        registry: &GpuRegistry<B>,
        before: ResourceState,
        after: ResourceState,
    ) -> RenderResult<()> {
        for buffer in self.prepared()?.buffers {
            list.transition_buffer(registry.buffer(buffer)?, before, after)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tiles_are_counted() {
        assert_eq!(tile_count(Extent2D::new(1920, 1080), 16), (120, 68));
        assert_eq!(tile_count(Extent2D::new(16, 16), 16), (1, 1));
        assert_eq!(tile_count(Extent2D::new(17, 1), 16), (2, 1));
    }
}
