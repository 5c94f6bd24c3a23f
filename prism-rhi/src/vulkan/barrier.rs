//! Resource states expressed as synchronization2 stage, access and layout triples.

use ash::vk;
use crate::types::ResourceState;

const SHADER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER.as_raw()
        | vk::PipelineStageFlags2::GEOMETRY_SHADER.as_raw()
        | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

const DEPTH_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

pub(crate) trait StateExt: Copy {
    fn pipeline_stage(self) -> vk::PipelineStageFlags2;

    fn access_flags(self) -> vk::AccessFlags2;

    fn image_layout(self) -> vk::ImageLayout;
}

impl StateExt for ResourceState {
    fn pipeline_stage(self) -> vk::PipelineStageFlags2 {
        match self {
            ResourceState::Common => vk::PipelineStageFlags2::ALL_COMMANDS,
            ResourceState::VertexAndConstantBuffer => vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT | SHADER_STAGES,
            ResourceState::IndexBuffer => vk::PipelineStageFlags2::INDEX_INPUT,
            ResourceState::RenderTarget => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            ResourceState::UnorderedAccess | ResourceState::ShaderResource => SHADER_STAGES,
            ResourceState::DepthWrite | ResourceState::DepthRead => DEPTH_STAGES,
            ResourceState::CopySource | ResourceState::CopyDestination => vk::PipelineStageFlags2::TRANSFER,
            // presentation engine reads happen outside the pipeline
            ResourceState::Present => vk::PipelineStageFlags2::NONE,
        }
    }

    fn access_flags(self) -> vk::AccessFlags2 {
        match self {
            ResourceState::Common => vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            ResourceState::VertexAndConstantBuffer => {
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ | vk::AccessFlags2::UNIFORM_READ
            }
            ResourceState::IndexBuffer => vk::AccessFlags2::INDEX_READ,
            ResourceState::RenderTarget => {
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
            }
            ResourceState::UnorderedAccess => {
                vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
            }
            ResourceState::DepthWrite => {
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ResourceState::DepthRead => vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
            ResourceState::ShaderResource => vk::AccessFlags2::SHADER_SAMPLED_READ | vk::AccessFlags2::SHADER_STORAGE_READ,
            ResourceState::CopySource => vk::AccessFlags2::TRANSFER_READ,
            ResourceState::CopyDestination => vk::AccessFlags2::TRANSFER_WRITE,
            ResourceState::Present => vk::AccessFlags2::NONE,
        }
    }

    fn image_layout(self) -> vk::ImageLayout {
        match self {
            ResourceState::Common | ResourceState::UnorderedAccess => vk::ImageLayout::GENERAL,
            ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ResourceState::CopyDestination => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            // buffer only states, never reached for images
            ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer => vk::ImageLayout::GENERAL,
        }
    }
}

/// Image transition over every mip and layer. `discard` starts from `UNDEFINED`, dropping the
/// previous contents.
pub(crate) fn texture_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    before: ResourceState,
    after: ResourceState,
    discard: bool,
) -> vk::ImageMemoryBarrier2<'static> {
    let old_layout = if discard { vk::ImageLayout::UNDEFINED } else { before.image_layout() };
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(before.pipeline_stage())
        .src_access_mask(before.access_flags())
        .dst_stage_mask(after.pipeline_stage())
        .dst_access_mask(after.access_flags())
        .old_layout(old_layout)
        .new_layout(after.image_layout())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(vk::REMAINING_MIP_LEVELS)
                .base_array_layer(0)
                .layer_count(vk::REMAINING_ARRAY_LAYERS),
        )
}

pub(crate) fn buffer_barrier(
    buffer: vk::Buffer,
    before: ResourceState,
    after: ResourceState,
) -> vk::BufferMemoryBarrier2<'static> {
    vk::BufferMemoryBarrier2::default()
        .src_stage_mask(before.pipeline_stage())
        .src_access_mask(before.access_flags())
        .dst_stage_mask(after.pipeline_stage())
        .dst_access_mask(after.access_flags())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}

/// Orders unordered access writes against later unordered access of the same resource.
pub(crate) fn unordered_access_barrier() -> vk::MemoryBarrier2<'static> {
    vk::MemoryBarrier2::default()
        .src_stage_mask(SHADER_STAGES)
        .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
        .dst_stage_mask(SHADER_STAGES)
        .dst_access_mask(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discarding_transition_starts_undefined() {
        let barrier = texture_barrier(
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
            ResourceState::Present,
            ResourceState::RenderTarget,
            true,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);

        let barrier = texture_barrier(
            vk::Image::null(),
            vk::ImageAspectFlags::DEPTH,
            ResourceState::DepthWrite,
            ResourceState::ShaderResource,
            false,
        );
        assert_eq!(barrier.old_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.src_stage_mask, DEPTH_STAGES);
    }

    #[test]
    fn compute_writes_are_shader_storage_accesses() {
        assert!(ResourceState::UnorderedAccess
            .pipeline_stage()
            .contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert!(ResourceState::UnorderedAccess
            .access_flags()
            .contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));
        assert_eq!(ResourceState::Present.image_layout(), vk::ImageLayout::PRESENT_SRC_KHR);
    }
}
