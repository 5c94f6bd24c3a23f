//! Graphics and compute pipelines over dynamic rendering.

use std::ffi::CString;
use std::io::Cursor;
use ash::vk;
use prism_core::collections::SmallVec;
use prism_rhi_derive::DeviceObject;
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::format::PixelFormat;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, PrimitiveTopology, StencilFaceState};
use crate::render_pass::MAX_RENDER_TARGETS;
use crate::shader::{ShaderBlob, ShaderTarget};
use super::conv;
use super::device::VulkanDevice;
use super::layout::VulkanResourceLayout;

const DYNAMIC_STATES: [vk::DynamicState; 3] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::STENCIL_REFERENCE,
];

/// A shader module alive for the duration of pipeline creation.
struct ShaderStage<'a> {
    device: &'a ash::Device,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    entry_point: CString,
}

impl<'a> ShaderStage<'a> {
    fn new(device: &'a ash::Device, blob: &ShaderBlob) -> RhiResult<Self> {
        if blob.target() != ShaderTarget::Spirv {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} shader `{}` was compiled to {:?}, Vulkan consumes SPIR-V",
                blob.shader_type(),
                blob.entry_point(),
                blob.target()
            )));
        }
        let words = ash::util::read_spv(&mut Cursor::new(blob.code()))?;
        let entry_point = CString::new(blob.entry_point())
            .map_err(|_| RhiError::InvalidDescriptor(format!("entry point `{}` contains a nul byte", blob.entry_point())))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.create_shader_module(&create_info, None) }.context("vkCreateShaderModule")?;
        Ok(Self {
            device,
            module,
            stage: conv::shader_stage(blob.shader_type()),
            entry_point,
        })
    }

    fn create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for ShaderStage<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn stencil_face(face: &StencilFaceState, read_mask: u8, write_mask: u8) -> vk::StencilOpState {
    vk::StencilOpState::default()
        .fail_op(conv::stencil_op(face.fail))
        .pass_op(conv::stencil_op(face.pass))
        .depth_fail_op(conv::stencil_op(face.depth_fail))
        .compare_op(conv::compare_op(face.compare))
        .compare_mask(read_mask as u32)
        .write_mask(write_mask as u32)
}

#[DeviceObject]
pub struct VulkanGraphicsPipeline {
    pipeline: vk::Pipeline,
}

impl VulkanGraphicsPipeline {
    #[profiling::function]
    pub(crate) fn new(
        device: &VulkanDevice,
        layout: &VulkanResourceLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        let stages = desc
            .shaders()
            .map(|blob| ShaderStage::new(device.handle(), blob))
            .collect::<RhiResult<SmallVec<[ShaderStage; 5]>>>()?;
        let stage_infos: SmallVec<[vk::PipelineShaderStageCreateInfo; 5]> =
            stages.iter().map(ShaderStage::create_info).collect();

        let input = desc.input_assembly;
        let vertex_bindings: SmallVec<[vk::VertexInputBindingDescription; 2]> = input
            .strides
            .iter()
            .enumerate()
            .map(|(slot, &stride)| {
                vk::VertexInputBindingDescription::default()
                    .binding(slot as u32)
                    .stride(stride)
                    .input_rate(vk::VertexInputRate::VERTEX)
            })
            .collect();
        let vertex_attributes: SmallVec<[vk::VertexInputAttributeDescription; 8]> = input
            .elements
            .iter()
            .map(|element| {
                vk::VertexInputAttributeDescription::default()
                    .location(element.location)
                    .binding(element.input_slot)
                    .format(conv::format(element.format))
                    .offset(element.offset)
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(conv::topology(input.topology));
        let tessellation = match input.topology {
            PrimitiveTopology::PatchList(points) => {
                Some(vk::PipelineTessellationStateCreateInfo::default().patch_control_points(points as u32))
            }
            _ => None,
        };

        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let raster = desc.rasterizer;
        let depth_bias_enable =
            raster.depth_bias != 0 || raster.slope_scaled_depth_bias != 0.0 || raster.depth_bias_clamp != 0.0;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(!raster.depth_clip && device.features().depth_clamp)
            .polygon_mode(if device.features().fill_mode_non_solid {
                conv::polygon_mode(raster.fill_mode)
            } else {
                vk::PolygonMode::FILL
            })
            .cull_mode(conv::cull_mode(raster.cull_mode))
            .front_face(conv::front_face(raster.front_face))
            .depth_bias_enable(depth_bias_enable)
            .depth_bias_constant_factor(raster.depth_bias as f32)
            .depth_bias_clamp(raster.depth_bias_clamp)
            .depth_bias_slope_factor(raster.slope_scaled_depth_bias)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(conv::sample_count(desc.sample_count))
            .alpha_to_coverage_enable(desc.blend.alpha_to_coverage);

        let ds = desc.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test)
            .depth_write_enable(ds.depth_write)
            .depth_compare_op(conv::compare_op(ds.depth_compare))
            .stencil_test_enable(ds.stencil_test)
            .front(stencil_face(&ds.front, ds.stencil_read_mask, ds.stencil_write_mask))
            .back(stencil_face(&ds.back, ds.stencil_read_mask, ds.stencil_write_mask));

        let attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; MAX_RENDER_TARGETS]> = (0..desc
            .render_target_formats
            .len())
            .map(|index| {
                let target = desc.blend.target(index);
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(target.enable)
                    .src_color_blend_factor(conv::blend_factor(target.src_color))
                    .dst_color_blend_factor(conv::blend_factor(target.dst_color))
                    .color_blend_op(conv::blend_op(target.color_op))
                    .src_alpha_blend_factor(conv::blend_factor(target.src_alpha))
                    .dst_alpha_blend_factor(conv::blend_factor(target.dst_alpha))
                    .alpha_blend_op(conv::blend_op(target.alpha_op))
                    .color_write_mask(conv::color_write_mask(target.write_mask))
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let color_formats: SmallVec<[vk::Format; MAX_RENDER_TARGETS]> =
            desc.render_target_formats.iter().map(|&f| conv::format(f)).collect();
        let mut rendering = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if desc.depth_stencil_format != PixelFormat::Unknown {
            let depth_format = conv::format(desc.depth_stencil_format);
            rendering = rendering.depth_attachment_format(depth_format);
            if desc.depth_stencil_format.has_stencil() {
                rendering = rendering.stencil_attachment_format(depth_format);
            }
        }

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .push_next(&mut rendering);
        if let Some(tessellation) = tessellation.as_ref() {
            create_info = create_info.tessellation_state(tessellation);
        }

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| RhiError::backend("vkCreateGraphicsPipelines", e))?;
        let pipeline = pipelines[0];
        device.set_debug_name(pipeline, desc.name);

        Ok(Self {
            pipeline,
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[DeviceObject]
pub struct VulkanComputePipeline {
    pipeline: vk::Pipeline,
}

impl VulkanComputePipeline {
    #[profiling::function]
    pub(crate) fn new(
        device: &VulkanDevice,
        layout: &VulkanResourceLayout,
        desc: &ComputePipelineDesc<'_>,
    ) -> RhiResult<Self> {
        let stage = ShaderStage::new(device.handle(), desc.compute)?;
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage.create_info())
            .layout(layout.handle());

        let pipelines = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| RhiError::backend("vkCreateComputePipelines", e))?;
        let pipeline = pipelines[0];
        device.set_debug_name(pipeline, desc.name);

        Ok(Self {
            pipeline,
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StencilOp;
    use crate::types::CompareOp;

    #[test]
    fn stencil_masks_apply_to_both_faces() {
        let face = StencilFaceState {
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Zero,
            pass: StencilOp::Replace,
            compare: CompareOp::Equal,
        };
        let state = stencil_face(&face, 0x0f, 0xf0);
        assert_eq!(state.compare_mask, 0x0f);
        assert_eq!(state.write_mask, 0xf0);
        assert_eq!(state.pass_op, vk::StencilOp::REPLACE);
        assert_eq!(state.compare_op, vk::CompareOp::EQUAL);
    }
}
