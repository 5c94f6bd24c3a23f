//! Render passes of the universal render pipeline.
//!
//! Each pass owns its resource layout, pipeline state and render pass, plus one set of targets
//! per frame in flight indexed by the engine's current frame index. Passes refer to models and
//! to each other's targets through registry handles only.

mod forward;
mod gbuffer;
mod light_culling;
mod zprepass;

pub use forward::ForwardPass;
pub use gbuffer::{GBuffer, GBufferType};
pub use light_culling::{tile_count, CullingLightType, LightCulling, TILE_CONSTANT_COUNT};
pub use zprepass::ZPrepass;

use prism_core::collections::SmallVec;
use prism_rhi::{Backend, RhiCommandList};
use crate::error::RenderResult;
use crate::model::GameModel;
use crate::registry::{GpuRegistry, ModelHandle};

/// Ordered set of the models a pass draws.
#[derive(Debug, Clone, Default)]
pub struct ModelList {
    models: Vec<ModelHandle>,
}

impl ModelList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the model is already listed.
    pub fn add(&mut self, model: ModelHandle) -> bool {
        if self.models.contains(&model) {
            return false;
        }
        self.models.push(model);
        true
    }

    pub fn remove(&mut self, model: ModelHandle) -> bool {
        let before = self.models.len();
        self.models.retain(|&listed| listed != model);
        self.models.len() != before
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }

    #[inline]
    pub fn contains(&self, model: ModelHandle) -> bool {
        self.models.contains(&model)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ModelHandle> + '_ {
        self.models.iter().copied()
    }

    /// Listed models that are still registered and active. Destroyed models are skipped.
    pub fn drawable<'a, B: Backend>(&'a self, registry: &'a GpuRegistry<B>) -> impl Iterator<Item = &'a GameModel> + 'a {
        self.models
            .iter()
            .filter_map(move |&handle| registry.model(handle).ok())
            .filter(|model| model.is_active())
    }
}

/// Per frame in flight objects of a pass.
pub(crate) type PerFrame<T> = SmallVec<[T; 4]>;

/// Bind the geometry of `model` and write its object constants for `frame_index`.
pub(crate) fn bind_model<B: Backend>(
    list: &mut B::CommandList,
    registry: &GpuRegistry<B>,
    model: &GameModel,
    frame_index: u32,
) -> RenderResult<()> {
    model.write_object_constants(registry, frame_index)?;
    list.set_vertex_buffer(0, registry.buffer(model.vertex_buffer())?)?;
    list.set_index_buffer(registry.buffer(model.index_buffer())?, model.index_format())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn models_are_listed_once_in_order() {
        let mut keys = SlotMap::<ModelHandle, ()>::with_key();
        let (a, b) = (keys.insert(()), keys.insert(()));

        let mut list = ModelList::new();
        assert!(list.add(a));
        assert!(list.add(b));
        assert!(!list.add(a));
        assert_eq!(list.iter().collect::<Vec<_>>(), [a, b]);

        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.len(), 1);

        list.clear();
        assert!(list.is_empty());
    }
}
