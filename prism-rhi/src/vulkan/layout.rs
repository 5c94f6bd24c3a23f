//! Resource layouts as descriptor set layouts, one set per register space.
//!
//! Bindings are the HLSL register plus the shift the shader compiler applied to its class, so
//! `t3` in `space1` lands in set 1 at binding `SPIRV_SRV_SHIFT + 3`. Static samplers become
//! immutable samplers of their set and are never written at bind time.

use ash::vk;
use prism_core::collections::SmallVec;
use prism_rhi_derive::DeviceObject;
use crate::backend::RhiResourceLayout;
use crate::error::{RhiResult, ResultExt};
use crate::layout::{ResourceLayoutDesc, ResourceLayoutElement};
use crate::shader::{SPIRV_CBV_SHIFT, SPIRV_SAMPLER_SHIFT, SPIRV_SRV_SHIFT, SPIRV_UAV_SHIFT};
use crate::types::DescriptorType;
use super::conv;
use super::device::VulkanDevice;
use super::resource::create_sampler;

pub(crate) fn binding(descriptor_type: DescriptorType, shader_register: u32) -> u32 {
    let shift = match descriptor_type {
        DescriptorType::ConstantBuffer => SPIRV_CBV_SHIFT,
        DescriptorType::ShaderResource => SPIRV_SRV_SHIFT,
        DescriptorType::UnorderedAccess => SPIRV_UAV_SHIFT,
    };
    shift + shader_register
}

#[DeviceObject]
pub struct VulkanResourceLayout {
    desc: ResourceLayoutDesc,
    set_layouts: SmallVec<[vk::DescriptorSetLayout; 4]>,
    immutable_samplers: SmallVec<[vk::Sampler; 2]>,
    pipeline_layout: vk::PipelineLayout,
    push_stages: vk::ShaderStageFlags,
}

impl VulkanResourceLayout {
    pub(crate) fn new(device: &VulkanDevice, desc: &ResourceLayoutDesc) -> RhiResult<Self> {
        desc.validate()?;

        // partially built layouts are released by drop on early return
        let mut layout = Self {
            desc: desc.clone(),
            set_layouts: SmallVec::new(),
            immutable_samplers: SmallVec::new(),
            pipeline_layout: vk::PipelineLayout::null(),
            push_stages: vk::ShaderStageFlags::empty(),
            device: device.handle().clone(),
        };

        for sampler in &desc.samplers {
            let handle = create_sampler(device, &sampler.sampler)?;
            layout.immutable_samplers.push(handle);
        }

        let set_count = desc.max_register_space().map_or(0, |space| space + 1);
        for space in 0..set_count {
            let mut bindings: SmallVec<[vk::DescriptorSetLayoutBinding; 16]> = desc
                .elements
                .iter()
                .filter(|e| e.register_space == space)
                .map(|e| {
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(binding(e.descriptor_type, e.shader_register))
                        .descriptor_type(conv::descriptor_type(e.descriptor_type, e.dimension))
                        .descriptor_count(1)
                        .stage_flags(conv::shader_visibility(e.visibility))
                })
                .collect();

            for (index, sampler) in desc.samplers.iter().enumerate() {
                if sampler.register_space != space {
                    continue;
                }
                bindings.push(
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(SPIRV_SAMPLER_SHIFT + sampler.shader_register)
                        .descriptor_type(vk::DescriptorType::SAMPLER)
                        .stage_flags(conv::shader_visibility(sampler.visibility))
                        .immutable_samplers(std::slice::from_ref(&layout.immutable_samplers[index])),
                );
            }

            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let set_layout = unsafe { device.handle().create_descriptor_set_layout(&create_info, None) }
                .context("vkCreateDescriptorSetLayout")?;
            layout.set_layouts.push(set_layout);
        }

        let push_ranges: SmallVec<[vk::PushConstantRange; 1]> = desc
            .constants
            .iter()
            .map(|c| {
                vk::PushConstantRange::default()
                    .stage_flags(conv::shader_visibility(c.visibility))
                    .offset(0)
                    .size(c.count * 4)
            })
            .collect();
        layout.push_stages = push_ranges.first().map_or(vk::ShaderStageFlags::empty(), |r| r.stage_flags);

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&layout.set_layouts)
            .push_constant_ranges(&push_ranges);
        layout.pipeline_layout = unsafe { device.handle().create_pipeline_layout(&create_info, None) }
            .context("vkCreatePipelineLayout")?;
        device.set_debug_name(layout.pipeline_layout, &desc.name);

        log::debug!(
            "Resource layout `{}` created with {} sets, {} samplers",
            desc.name,
            layout.set_layouts.len(),
            layout.immutable_samplers.len()
        );
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub(crate) fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    #[inline]
    pub(crate) fn push_stages(&self) -> vk::ShaderStageFlags {
        self.push_stages
    }

    /// Elements in bind order.
    pub(crate) fn elements(&self) -> impl Iterator<Item = &ResourceLayoutElement> {
        self.desc.elements.iter()
    }
}

impl RhiResourceLayout for VulkanResourceLayout {
    #[inline]
    fn desc(&self) -> &ResourceLayoutDesc {
        &self.desc
    }
}

impl Drop for VulkanResourceLayout {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline_layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            for &set_layout in &self.set_layouts {
                self.device.destroy_descriptor_set_layout(set_layout, None);
            }
            for &sampler in &self.immutable_samplers {
                self.device.destroy_sampler(sampler, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_classes_do_not_collide() {
        assert_eq!(binding(DescriptorType::ConstantBuffer, 2), 2);
        assert_eq!(binding(DescriptorType::ShaderResource, 2), SPIRV_SRV_SHIFT + 2);
        assert_eq!(binding(DescriptorType::UnorderedAccess, 0), SPIRV_UAV_SHIFT);
        assert!(binding(DescriptorType::UnorderedAccess, 63) < SPIRV_SAMPLER_SHIFT);
    }
}
