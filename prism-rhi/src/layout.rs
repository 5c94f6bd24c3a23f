//! Resource layouts: the binding contract between shaders and command lists.
//!
//! A layout is an ordered list of descriptor declarations. The order of
//! [`ResourceLayoutDesc::elements`] is the order views are passed to the bind calls of a command
//! list, and register/space pairs must match the HLSL declarations. There is no reflection.

use prism_core::collections::SmallVec;
use crate::error::{BindingMismatch, RhiError, RhiResult};
use crate::resource::SamplerDesc;
use crate::types::{DescriptorType, ResourceDimension, ResourceViewType, ShaderVisibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLayoutElement {
    pub descriptor_type: DescriptorType,
    pub dimension: ResourceDimension,
    pub shader_register: u32,
    pub register_space: u32,
    pub visibility: ShaderVisibility,
}

impl ResourceLayoutElement {
    pub const fn new(
        descriptor_type: DescriptorType,
        dimension: ResourceDimension,
        shader_register: u32,
        register_space: u32,
        visibility: ShaderVisibility,
    ) -> Self {
        Self {
            descriptor_type,
            dimension,
            shader_register,
            register_space,
            visibility,
        }
    }

    /// `cbuffer` at `b{register}`.
    pub const fn constant_buffer(shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self::new(DescriptorType::ConstantBuffer, ResourceDimension::Buffer, shader_register, register_space, visibility)
    }

    /// `Texture2D` at `t{register}`.
    pub const fn texture(shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self::new(DescriptorType::ShaderResource, ResourceDimension::Texture, shader_register, register_space, visibility)
    }

    /// `StructuredBuffer` at `t{register}`.
    pub const fn structured_buffer(shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self::new(DescriptorType::ShaderResource, ResourceDimension::Buffer, shader_register, register_space, visibility)
    }

    /// `RWStructuredBuffer` at `u{register}`.
    pub const fn rw_buffer(shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self::new(DescriptorType::UnorderedAccess, ResourceDimension::Buffer, shader_register, register_space, visibility)
    }

    /// `RWTexture2D` at `u{register}`.
    pub const fn rw_texture(shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self::new(DescriptorType::UnorderedAccess, ResourceDimension::Texture, shader_register, register_space, visibility)
    }
}

/// Static sampler baked into the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerLayoutElement {
    pub sampler: SamplerDesc,
    pub shader_register: u32,
    pub register_space: u32,
    pub visibility: ShaderVisibility,
}

impl SamplerLayoutElement {
    pub fn new(sampler: SamplerDesc, shader_register: u32, register_space: u32, visibility: ShaderVisibility) -> Self {
        Self {
            sampler,
            shader_register,
            register_space,
            visibility,
        }
    }
}

/// Inline 32 bit constants, `cbuffer` at `b{register}` filled by `push_constants`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub shader_register: u32,
    pub register_space: u32,
    pub visibility: ShaderVisibility,
    /// Number of 32 bit values.
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceLayoutDesc {
    pub name: String,
    pub elements: SmallVec<[ResourceLayoutElement; 8]>,
    pub samplers: SmallVec<[SamplerLayoutElement; 2]>,
    pub constants: Option<PushConstantRange>,
    /// Graphics layouts read vertex input, compute layouts do not.
    pub input_assembler: bool,
}

impl ResourceLayoutDesc {
    pub fn graphics(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_assembler: true,
            ..Default::default()
        }
    }

    pub fn compute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_assembler: false,
            ..Default::default()
        }
    }

    pub fn with_element(mut self, element: ResourceLayoutElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerLayoutElement) -> Self {
        self.samplers.push(sampler);
        self
    }

    pub fn with_constants(mut self, constants: PushConstantRange) -> Self {
        self.constants = Some(constants);
        self
    }

    /// Highest register space in use, `None` for an empty layout.
    pub fn max_register_space(&self) -> Option<u32> {
        self.elements
            .iter()
            .map(|e| e.register_space)
            .chain(self.samplers.iter().map(|s| s.register_space))
            .max()
    }

    /// Reject layouts declaring the same register twice.
    pub fn validate(&self) -> RhiResult<()> {
        let mut seen: SmallVec<[(u8, u32, u32); 16]> = SmallVec::new();
        let registers = self
            .elements
            .iter()
            .map(|e| (register_class(e.descriptor_type), e.shader_register, e.register_space))
            .chain(self.samplers.iter().map(|s| (3u8, s.shader_register, s.register_space)))
            .chain(self.constants.iter().map(|c| (0u8, c.shader_register, c.register_space)));

        for key in registers {
            if seen.contains(&key) {
                return Err(RhiError::InvalidDescriptor(format!(
                    "layout `{}` declares register {}{} in space {} twice",
                    self.name,
                    ['b', 't', 'u', 's'][key.0 as usize],
                    key.1,
                    key.2
                )));
            }
            seen.push(key);
        }
        Ok(())
    }

    /// Check a view table against this layout before it is bound.
    pub fn validate_views(&self, views: &[ResourceViewType]) -> RhiResult<()> {
        if views.len() != self.elements.len() {
            return Err(RhiError::BindingMismatch(BindingMismatch::Count {
                expected: self.elements.len(),
                actual: views.len(),
            }));
        }

        for (slot, (element, &view)) in self.elements.iter().zip(views).enumerate() {
            if view.descriptor_type() != Some(element.descriptor_type) {
                return Err(RhiError::BindingMismatch(BindingMismatch::Type {
                    slot,
                    expected: element.descriptor_type,
                    actual: view,
                }));
            }
        }
        Ok(())
    }
}

fn register_class(ty: DescriptorType) -> u8 {
    match ty {
        DescriptorType::ConstantBuffer => 0,
        DescriptorType::ShaderResource => 1,
        DescriptorType::UnorderedAccess => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn culling_layout() -> ResourceLayoutDesc {
        ResourceLayoutDesc::compute("culling")
            .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::All))
            .with_element(ResourceLayoutElement::texture(0, 0, ShaderVisibility::All))
            .with_element(ResourceLayoutElement::rw_buffer(0, 0, ShaderVisibility::All))
    }

    #[test]
    fn matching_views_bind() {
        let layout = culling_layout();
        layout
            .validate_views(&[
                ResourceViewType::ConstantBuffer,
                ResourceViewType::ShaderResource,
                ResourceViewType::UnorderedAccess,
            ])
            .unwrap();
    }

    #[test]
    fn wrong_count_or_type_is_rejected() {
        let layout = culling_layout();
        assert!(matches!(
            layout.validate_views(&[ResourceViewType::ConstantBuffer]),
            Err(RhiError::BindingMismatch(BindingMismatch::Count { expected: 3, actual: 1 }))
        ));

        let result = layout.validate_views(&[
            ResourceViewType::ConstantBuffer,
            ResourceViewType::UnorderedAccess,
            ResourceViewType::UnorderedAccess,
        ]);
        assert!(matches!(
            result,
            Err(RhiError::BindingMismatch(BindingMismatch::Type { slot: 1, .. }))
        ));

        let result = layout.validate_views(&[
            ResourceViewType::ConstantBuffer,
            ResourceViewType::ShaderResource,
            ResourceViewType::RenderTarget,
        ]);
        assert!(matches!(
            result,
            Err(RhiError::BindingMismatch(BindingMismatch::Type { slot: 2, .. }))
        ));
    }

    #[test]
    fn duplicate_registers_are_rejected() {
        let layout = culling_layout()
            .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::Pixel));
        assert!(layout.validate().is_err());

        // same register number in another class or space is fine
        let layout = culling_layout()
            .with_element(ResourceLayoutElement::constant_buffer(0, 1, ShaderVisibility::Pixel))
            .with_sampler(SamplerLayoutElement::new(SamplerDesc::default(), 0, 0, ShaderVisibility::Pixel));
        layout.validate().unwrap();
        assert_eq!(layout.max_register_space(), Some(1));
    }
}
