use ash::vk;
use prism_core::collections::SmallVec;
use prism_rhi_derive::DeviceObject;
use crate::backend::{RhiCommandQueue, RhiFence};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::types::CommandListType;
use super::command::VulkanCommandList;
use super::device::{DebuggableObject, VulkanDevice};
use super::Vulkan;

/// A queue wrapper that carries its family index.
#[DeviceObject]
pub struct VulkanCommandQueue {
    queue_type: CommandListType,
    queue: vk::Queue,
    family_index: u32,
}

impl VulkanCommandQueue {
    pub(crate) fn new(device: &VulkanDevice, queue_type: CommandListType) -> Self {
        let family_index = device.queue_families().family(queue_type);
        let queue = unsafe { device.handle().get_device_queue(family_index, 0) };
        let queue = Self {
            queue_type,
            queue,
            family_index,
            device: device.handle().clone(),
        };
        queue.set_debug_name(device);
        queue
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.family_index
    }

    /// Submit without command buffers, only to order semaphore operations on this queue.
    pub(crate) fn submit_semaphores(
        &self,
        waits: &[vk::SemaphoreSubmitInfo<'_>],
        signals: &[vk::SemaphoreSubmitInfo<'_>],
    ) -> RhiResult<()> {
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(waits)
            .signal_semaphore_infos(signals);
        unsafe { self.device.queue_submit2(self.queue, &[submit_info], vk::Fence::null()) }.context("vkQueueSubmit2")
    }
}

impl DebuggableObject for VulkanCommandQueue {
    fn set_debug_name(&self, device: &VulkanDevice) {
        device.set_debug_name(self.queue, &format!("{:?} queue", self.queue_type));
    }
}

impl RhiCommandQueue<Vulkan> for VulkanCommandQueue {
    #[inline]
    fn queue_type(&self) -> CommandListType {
        self.queue_type
    }

    #[profiling::function]
    fn execute(&self, lists: &[&VulkanCommandList]) -> RhiResult<()> {
        let command_buffer_infos = lists
            .iter()
            .map(|list| {
                list.ensure_submittable(self.queue_type)?;
                Ok(vk::CommandBufferSubmitInfo::default().command_buffer(list.handle()))
            })
            .collect::<RhiResult<SmallVec<[vk::CommandBufferSubmitInfo; 4]>>>()?;

        let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&command_buffer_infos);
        unsafe { self.device.queue_submit2(self.queue, &[submit_info], vk::Fence::null()) }.context("vkQueueSubmit2")
    }

    fn signal(&self, fence: &VulkanFence, value: u64) -> RhiResult<()> {
        let signal = vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.handle())
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        self.submit_semaphores(&[], &[signal])
    }

    fn wait(&self, fence: &VulkanFence, value: u64) -> RhiResult<()> {
        let wait = vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.handle())
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        self.submit_semaphores(&[wait], &[])
    }
}

/// Timeline semaphore.
#[DeviceObject]
pub struct VulkanFence {
    semaphore: vk::Semaphore,
}

impl VulkanFence {
    pub(crate) fn new(device: &VulkanDevice, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }.context("vkCreateSemaphore")?;

        Ok(Self {
            semaphore,
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl RhiFence for VulkanFence {
    fn completed_value(&self) -> u64 {
        match unsafe { self.device.get_semaphore_counter_value(self.semaphore) } {
            Ok(value) => value,
            Err(e) => {
                log::error!("vkGetSemaphoreCounterValue failed: {e}");
                0
            }
        }
    }

    fn signal(&self, value: u64) -> RhiResult<()> {
        let current = self.completed_value();
        if value < current {
            return Err(RhiError::FenceValueDecreased { current, requested: value });
        }
        if value == current {
            return Ok(());
        }
        let info = vk::SemaphoreSignalInfo::default().semaphore(self.semaphore).value(value);
        unsafe { self.device.signal_semaphore(&info) }.context("vkSignalSemaphore")
    }

    #[profiling::function]
    fn wait(&self, value: u64) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default().semaphores(&semaphores).values(&values);
        unsafe { self.device.wait_semaphores(&info, u64::MAX) }.context("vkWaitSemaphores")
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
