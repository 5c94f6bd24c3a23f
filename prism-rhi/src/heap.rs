//! Descriptor index allocation.
//!
//! Every backend hands out descriptor indices through [`DescriptorAllocator`], so heap budgets
//! behave the same on Vulkan (where the index is pure bookkeeping), DirectX12 (where it is the
//! offset into a native heap) and the headless backend.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use crate::backend::RhiDescriptorHeap;
use crate::error::{RhiError, RhiResult};
use crate::types::DescriptorHeapType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    pub heap_type: DescriptorHeapType,
    pub capacity: u32,
    pub shader_visible: bool,
}

#[derive(Debug)]
struct HeapState {
    heap_type: DescriptorHeapType,
    capacity: u32,
    next: u32,
    free: Vec<u32>,
}

impl HeapState {
    fn live(&self) -> u32 {
        self.next - self.free.len() as u32
    }
}

/// Fixed capacity index allocator. Not thread safe, owned by the device.
#[derive(Debug, Clone)]
pub struct DescriptorAllocator {
    state: Rc<RefCell<HeapState>>,
}

impl DescriptorAllocator {
    pub fn new(heap_type: DescriptorHeapType, capacity: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(HeapState {
                heap_type,
                capacity,
                next: 0,
                free: Vec::new(),
            })),
        }
    }

    /// Take one slot. Fails once `capacity` slots are alive, indices never wrap around.
    pub fn allocate(&self) -> RhiResult<DescriptorSlot> {
        let mut state = self.state.borrow_mut();

        let index = if let Some(index) = state.free.pop() {
            index
        } else if state.next < state.capacity {
            state.next += 1;
            state.next - 1
        } else {
            log::error!(
                "{:?} descriptor heap exhausted, all {} slots are in use",
                state.heap_type,
                state.capacity
            );
            return Err(RhiError::DescriptorHeapExhausted {
                heap: state.heap_type,
                capacity: state.capacity,
            });
        };

        Ok(DescriptorSlot {
            index,
            heap_type: state.heap_type,
            heap: Rc::downgrade(&self.state),
        })
    }

    #[inline]
    pub fn heap_type(&self) -> DescriptorHeapType {
        self.state.borrow().heap_type
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.state.borrow().capacity
    }

    /// Number of slots currently alive.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.state.borrow().live()
    }
}

impl RhiDescriptorHeap for DescriptorAllocator {
    #[inline]
    fn heap_type(&self) -> DescriptorHeapType {
        DescriptorAllocator::heap_type(self)
    }

    #[inline]
    fn capacity(&self) -> u32 {
        DescriptorAllocator::capacity(self)
    }

    #[inline]
    fn allocated(&self) -> u32 {
        DescriptorAllocator::allocated(self)
    }

    fn allocate(&self) -> RhiResult<DescriptorSlot> {
        DescriptorAllocator::allocate(self)
    }
}

/// One descriptor index. Returned to its heap when dropped.
#[derive(Debug)]
pub struct DescriptorSlot {
    index: u32,
    heap_type: DescriptorHeapType,
    heap: Weak<RefCell<HeapState>>,
}

impl DescriptorSlot {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }
}

impl Drop for DescriptorSlot {
    fn drop(&mut self) {
        if let Some(state) = self.heap.upgrade() {
            state.borrow_mut().free.push(self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_an_error_not_a_wraparound() {
        let heap = DescriptorAllocator::new(DescriptorHeapType::Srv, 4);
        let slots: Vec<_> = (0..4).map(|_| heap.allocate().unwrap()).collect();
        let indices: Vec<_> = slots.iter().map(|s| s.index()).collect();
        assert_eq!(indices, [0, 1, 2, 3]);

        for _ in 0..3 {
            match heap.allocate() {
                Err(RhiError::DescriptorHeapExhausted { heap, capacity }) => {
                    assert_eq!(heap, DescriptorHeapType::Srv);
                    assert_eq!(capacity, 4);
                }
                other => panic!("expected exhaustion, got {other:?}"),
            }
        }
        assert_eq!(heap.allocated(), 4);
    }

    #[test]
    fn dropped_slots_are_reused() {
        let heap = DescriptorAllocator::new(DescriptorHeapType::Rtv, 2);
        let first = heap.allocate().unwrap();
        let second = heap.allocate().unwrap();
        assert_eq!(second.index(), 1);

        drop(first);
        assert_eq!(heap.allocated(), 1);

        let third = heap.allocate().unwrap();
        assert_eq!(third.index(), 0);
        assert!(heap.allocate().is_err());
    }

    #[test]
    fn slot_outliving_its_heap_is_harmless() {
        let heap = DescriptorAllocator::new(DescriptorHeapType::Dsv, 1);
        let slot = heap.allocate().unwrap();
        drop(heap);
        assert_eq!(slot.heap_type(), DescriptorHeapType::Dsv);
        drop(slot);
    }
}
