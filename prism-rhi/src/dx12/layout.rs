//! Resource layouts as root signatures.
//!
//! Every register space with elements becomes one descriptor table, ranges follow element order
//! so a view table can be copied into shader visible memory as is. Static samplers are baked
//! into the root signature and push constants are the last root parameter.

use prism_core::collections::SmallVec;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::*;
use crate::backend::RhiResourceLayout;
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::layout::ResourceLayoutDesc;
use crate::types::ShaderVisibility;
use super::conv;
use super::device::{set_debug_name, Dx12Device};

/// One root descriptor table and the layout elements it holds, in bind order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DescriptorTable {
    pub(crate) root_index: u32,
    pub(crate) register_space: u32,
    pub(crate) elements: SmallVec<[usize; 8]>,
}

fn plan_tables(desc: &ResourceLayoutDesc) -> SmallVec<[DescriptorTable; 4]> {
    let mut tables: SmallVec<[DescriptorTable; 4]> = SmallVec::new();
    let space_count = desc.elements.iter().map(|e| e.register_space + 1).max().unwrap_or(0);
    for space in 0..space_count {
        let elements: SmallVec<[usize; 8]> = desc
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.register_space == space)
            .map(|(index, _)| index)
            .collect();
        if elements.is_empty() {
            continue;
        }
        tables.push(DescriptorTable {
            root_index: tables.len() as u32,
            register_space: space,
            elements,
        });
    }
    tables
}

fn table_visibility(desc: &ResourceLayoutDesc, table: &DescriptorTable) -> ShaderVisibility {
    let mut visibilities = table.elements.iter().map(|&index| desc.elements[index].visibility);
    let first = visibilities.next().unwrap_or_default();
    if visibilities.all(|visibility| visibility == first) { first } else { ShaderVisibility::All }
}

pub struct Dx12ResourceLayout {
    desc: ResourceLayoutDesc,
    root_signature: ID3D12RootSignature,
    tables: SmallVec<[DescriptorTable; 4]>,
    constants_index: Option<u32>,
}

impl Dx12ResourceLayout {
    pub(crate) fn new(device: &Dx12Device, desc: &ResourceLayoutDesc) -> RhiResult<Self> {
        desc.validate()?;

        let tables = plan_tables(desc);
        let ranges: SmallVec<[SmallVec<[D3D12_DESCRIPTOR_RANGE; 8]>; 4]> = tables
            .iter()
            .map(|table| {
                table
                    .elements
                    .iter()
                    .enumerate()
                    .map(|(offset, &index)| {
                        let element = &desc.elements[index];
                        D3D12_DESCRIPTOR_RANGE {
                            RangeType: conv::descriptor_range_type(element.descriptor_type),
                            NumDescriptors: 1,
                            BaseShaderRegister: element.shader_register,
                            RegisterSpace: element.register_space,
                            OffsetInDescriptorsFromTableStart: offset as u32,
                        }
                    })
                    .collect()
            })
            .collect();

        let mut parameters: SmallVec<[D3D12_ROOT_PARAMETER; 5]> = tables
            .iter()
            .zip(&ranges)
            .map(|(table, ranges)| D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                        NumDescriptorRanges: ranges.len() as u32,
                        pDescriptorRanges: ranges.as_ptr(),
                    },
                },
                ShaderVisibility: conv::shader_visibility(table_visibility(desc, table)),
            })
            .collect();

        let constants_index = desc.constants.map(|constants| {
            parameters.push(D3D12_ROOT_PARAMETER {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                Anonymous: D3D12_ROOT_PARAMETER_0 {
                    Constants: D3D12_ROOT_CONSTANTS {
                        ShaderRegister: constants.shader_register,
                        RegisterSpace: constants.register_space,
                        Num32BitValues: constants.count,
                    },
                },
                ShaderVisibility: conv::shader_visibility(constants.visibility),
            });
            parameters.len() as u32 - 1
        });

        let static_samplers: SmallVec<[D3D12_STATIC_SAMPLER_DESC; 2]> = desc
            .samplers
            .iter()
            .map(|s| conv::static_sampler(&s.sampler, s.shader_register, s.register_space, s.visibility))
            .collect();

        let root_desc = D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: if parameters.is_empty() { std::ptr::null() } else { parameters.as_ptr() },
            NumStaticSamplers: static_samplers.len() as u32,
            pStaticSamplers: if static_samplers.is_empty() { std::ptr::null() } else { static_samplers.as_ptr() },
            Flags: if desc.input_assembler {
                D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT
            } else {
                D3D12_ROOT_SIGNATURE_FLAG_NONE
            },
        };

        let blob = serialize(&root_desc)?;
        let root_signature: ID3D12RootSignature = unsafe {
            let bytes = std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize());
            device.handle().CreateRootSignature(0, bytes)
        }
        .context("CreateRootSignature")?;
        set_debug_name(&root_signature, &desc.name);

        log::debug!(
            "Resource layout `{}` created with {} tables, {} static samplers",
            desc.name,
            tables.len(),
            static_samplers.len()
        );
        Ok(Self {
            desc: desc.clone(),
            root_signature,
            tables,
            constants_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }

    #[inline]
    pub(crate) fn tables(&self) -> &[DescriptorTable] {
        &self.tables
    }

    #[inline]
    pub(crate) fn constants_index(&self) -> Option<u32> {
        self.constants_index
    }
}

fn serialize(desc: &D3D12_ROOT_SIGNATURE_DESC) -> RhiResult<ID3DBlob> {
    let mut blob: Option<ID3DBlob> = None;
    let mut error: Option<ID3DBlob> = None;
    let result = unsafe { D3D12SerializeRootSignature(desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, Some(&mut error)) };
    if let Err(e) = result {
        let message = error
            .map(|error| unsafe {
                let bytes = std::slice::from_raw_parts(error.GetBufferPointer() as *const u8, error.GetBufferSize());
                String::from_utf8_lossy(bytes).trim_end_matches('\0').to_owned()
            })
            .unwrap_or_else(|| e.to_string());
        return Err(RhiError::backend("D3D12SerializeRootSignature", message));
    }
    blob.ok_or_else(|| RhiError::backend("D3D12SerializeRootSignature", "no blob returned"))
}

impl RhiResourceLayout for Dx12ResourceLayout {
    #[inline]
    fn desc(&self) -> &ResourceLayoutDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ResourceLayoutElement;

    #[test]
    fn one_table_per_used_space() {
        let desc = ResourceLayoutDesc::graphics("gbuffer")
            .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::Vertex))
            .with_element(ResourceLayoutElement::texture(0, 2, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::constant_buffer(1, 0, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::texture(1, 2, ShaderVisibility::Pixel));

        let tables = plan_tables(&desc);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].register_space, 0);
        assert_eq!(tables[0].elements.as_slice(), &[0, 2]);
        assert_eq!(tables[1].register_space, 2);
        assert_eq!(tables[1].root_index, 1);
        assert_eq!(tables[1].elements.as_slice(), &[1, 3]);

        assert_eq!(table_visibility(&desc, &tables[0]), ShaderVisibility::All);
        assert_eq!(table_visibility(&desc, &tables[1]), ShaderVisibility::Pixel);
    }

    #[test]
    fn empty_layouts_have_no_tables() {
        assert!(plan_tables(&ResourceLayoutDesc::compute("empty")).is_empty());
    }
}
