use windows::core::{Interface, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use prism_core::collections::SmallVec;
use crate::backend::{RhiCommandQueue, RhiFence};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::types::CommandListType;
use super::command::Dx12CommandList;
use super::conv;
use super::device::{set_debug_name, Dx12Device};
use super::DirectX12;

pub struct Dx12CommandQueue {
    queue_type: CommandListType,
    queue: ID3D12CommandQueue,
}

impl Dx12CommandQueue {
    pub(crate) fn new(device: &Dx12Device, queue_type: CommandListType) -> RhiResult<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: conv::command_list_type(queue_type),
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let queue: ID3D12CommandQueue =
            unsafe { device.handle().CreateCommandQueue(&desc) }.context("CreateCommandQueue")?;
        set_debug_name(&queue, &format!("{queue_type:?} queue"));
        Ok(Self { queue_type, queue })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl RhiCommandQueue<DirectX12> for Dx12CommandQueue {
    #[inline]
    fn queue_type(&self) -> CommandListType {
        self.queue_type
    }

    #[profiling::function]
    fn execute(&self, lists: &[&Dx12CommandList]) -> RhiResult<()> {
        let native = lists
            .iter()
            .map(|list| {
                list.ensure_submittable(self.queue_type)?;
                let list: ID3D12CommandList = list.handle().cast().context("ID3D12GraphicsCommandList::cast")?;
                Ok(Some(list))
            })
            .collect::<RhiResult<SmallVec<[Option<ID3D12CommandList>; 4]>>>()?;

        unsafe { self.queue.ExecuteCommandLists(&native) };
        Ok(())
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> RhiResult<()> {
        unsafe { self.queue.Signal(fence.handle(), value) }.context("ID3D12CommandQueue::Signal")
    }

    fn wait(&self, fence: &Dx12Fence, value: u64) -> RhiResult<()> {
        unsafe { self.queue.Wait(fence.handle(), value) }.context("ID3D12CommandQueue::Wait")
    }
}

/// Native fence with the event cpu waits block on.
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

impl Dx12Fence {
    pub(crate) fn new(device: &Dx12Device, initial_value: u64) -> RhiResult<Self> {
        let fence: ID3D12Fence =
            unsafe { device.handle().CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }.context("CreateFence")?;
        let event = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }.context("CreateEventW")?;
        Ok(Self { fence, event })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl RhiFence for Dx12Fence {
    #[inline]
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn signal(&self, value: u64) -> RhiResult<()> {
        let current = self.completed_value();
        if value < current {
            return Err(RhiError::FenceValueDecreased { current, requested: value });
        }
        unsafe { self.fence.Signal(value) }.context("ID3D12Fence::Signal")
    }

    #[profiling::function]
    fn wait(&self, value: u64) -> RhiResult<()> {
        if self.completed_value() >= value {
            return Ok(());
        }
        unsafe {
            self.fence
                .SetEventOnCompletion(value, self.event)
                .context("ID3D12Fence::SetEventOnCompletion")?;
            WaitForSingleObject(self.event, INFINITE);
        }
        Ok(())
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.event) } {
            log::error!("Failed to close fence event: {e}");
        }
    }
}
