//! Resource barriers.
//!
//! Barriers borrow the resource pointer without touching its reference count, they must be
//! recorded before the resource they point at can be dropped.

use std::mem::ManuallyDrop;
use windows::Win32::Graphics::Direct3D12::*;
use crate::types::ResourceState;
use super::conv;

pub(crate) fn transition(resource: &ID3D12Resource, before: ResourceState, after: ResourceState) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: conv::resource_state(before),
                StateAfter: conv::resource_state(after),
            }),
        },
    }
}

/// Orders unordered access writes against the next access of the same resource.
pub(crate) fn unordered_access(resource: &ID3D12Resource) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            UAV: ManuallyDrop::new(D3D12_RESOURCE_UAV_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
            }),
        },
    }
}

/// A transition recorded later, keeping the resource alive until then.
#[derive(Clone)]
pub(crate) struct PendingTransition {
    pub(crate) resource: ID3D12Resource,
    pub(crate) before: ResourceState,
    pub(crate) after: ResourceState,
}

impl PendingTransition {
    #[inline]
    pub(crate) fn barrier(&self) -> D3D12_RESOURCE_BARRIER {
        transition(&self.resource, self.before, self.after)
    }
}
