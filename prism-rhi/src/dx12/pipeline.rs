//! Graphics and compute pipeline state objects.

use std::ffi::{c_void, CString};
use std::mem::ManuallyDrop;
use prism_core::collections::SmallVec;
use windows::core::PCSTR;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::pipeline::{ComputePipelineDesc, FrontFace, GraphicsPipelineDesc, StencilFaceState};
use crate::render_pass::MAX_RENDER_TARGETS;
use crate::shader::{ShaderBlob, ShaderTarget};
use super::conv;
use super::device::{set_debug_name, Dx12Device};
use super::layout::Dx12ResourceLayout;

fn bytecode(blob: Option<&ShaderBlob>) -> RhiResult<D3D12_SHADER_BYTECODE> {
    let Some(blob) = blob else {
        return Ok(D3D12_SHADER_BYTECODE::default());
    };
    if blob.target() != ShaderTarget::Dxil {
        return Err(RhiError::InvalidDescriptor(format!(
            "{:?} shader `{}` was compiled to {:?}, DirectX12 consumes DXIL",
            blob.shader_type(),
            blob.entry_point(),
            blob.target()
        )));
    }
    Ok(D3D12_SHADER_BYTECODE {
        pShaderBytecode: blob.code().as_ptr() as *const c_void,
        BytecodeLength: blob.code().len(),
    })
}

/// Borrow the root signature for the duration of pipeline creation.
fn borrowed_root_signature(layout: &Dx12ResourceLayout) -> ManuallyDrop<Option<ID3D12RootSignature>> {
    unsafe { std::mem::transmute_copy(layout.handle()) }
}

fn stencil_face(face: &StencilFaceState) -> D3D12_DEPTH_STENCILOP_DESC {
    D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: conv::stencil_op(face.fail),
        StencilDepthFailOp: conv::stencil_op(face.depth_fail),
        StencilPassOp: conv::stencil_op(face.pass),
        StencilFunc: conv::compare_func(face.compare),
    }
}

pub struct Dx12GraphicsPipeline {
    pipeline: ID3D12PipelineState,
    root_signature: ID3D12RootSignature,
    topology: D3D_PRIMITIVE_TOPOLOGY,
}

impl Dx12GraphicsPipeline {
    #[profiling::function]
    pub(crate) fn new(device: &Dx12Device, layout: &Dx12ResourceLayout, desc: &GraphicsPipelineDesc<'_>) -> RhiResult<Self> {
        if desc.render_target_formats.len() > MAX_RENDER_TARGETS {
            return Err(RhiError::InvalidDescriptor(format!(
                "pipeline `{}` renders to {} targets",
                desc.name,
                desc.render_target_formats.len()
            )));
        }

        let input = desc.input_assembly;
        let semantic_names = input
            .elements
            .iter()
            .map(|element| {
                CString::new(element.semantic_name).map_err(|_| {
                    RhiError::InvalidDescriptor(format!("semantic `{}` contains a nul byte", element.semantic_name))
                })
            })
            .collect::<RhiResult<SmallVec<[CString; 8]>>>()?;
        let input_elements: SmallVec<[D3D12_INPUT_ELEMENT_DESC; 8]> = input
            .elements
            .iter()
            .zip(&semantic_names)
            .map(|(element, name)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(name.as_ptr() as *const u8),
                SemanticIndex: element.semantic_index,
                Format: conv::format(element.format),
                InputSlot: element.input_slot,
                AlignedByteOffset: element.offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let raster = desc.rasterizer;
        let rasterizer = D3D12_RASTERIZER_DESC {
            FillMode: conv::fill_mode(raster.fill_mode),
            CullMode: conv::cull_mode(raster.cull_mode),
            FrontCounterClockwise: BOOL::from(raster.front_face == FrontFace::CounterClockwise),
            DepthBias: raster.depth_bias,
            DepthBiasClamp: raster.depth_bias_clamp,
            SlopeScaledDepthBias: raster.slope_scaled_depth_bias,
            DepthClipEnable: BOOL::from(raster.depth_clip),
            MultisampleEnable: BOOL::from(desc.sample_count > 1),
            AntialiasedLineEnable: BOOL::from(false),
            ForcedSampleCount: 0,
            ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
        };

        let ds = desc.depth_stencil;
        let depth_stencil = D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: BOOL::from(ds.depth_test),
            DepthWriteMask: if ds.depth_write { D3D12_DEPTH_WRITE_MASK_ALL } else { D3D12_DEPTH_WRITE_MASK_ZERO },
            DepthFunc: conv::compare_func(ds.depth_compare),
            StencilEnable: BOOL::from(ds.stencil_test),
            StencilReadMask: ds.stencil_read_mask,
            StencilWriteMask: ds.stencil_write_mask,
            FrontFace: stencil_face(&ds.front),
            BackFace: stencil_face(&ds.back),
        };

        let mut blend = D3D12_BLEND_DESC {
            AlphaToCoverageEnable: BOOL::from(desc.blend.alpha_to_coverage),
            IndependentBlendEnable: BOOL::from(desc.blend.independent_blend),
            RenderTarget: Default::default(),
        };
        for (index, native) in blend.RenderTarget.iter_mut().enumerate() {
            let target = desc.blend.target(index);
            *native = D3D12_RENDER_TARGET_BLEND_DESC {
                BlendEnable: BOOL::from(target.enable),
                LogicOpEnable: BOOL::from(false),
                SrcBlend: conv::blend(target.src_color),
                DestBlend: conv::blend(target.dst_color),
                BlendOp: conv::blend_op(target.color_op),
                SrcBlendAlpha: conv::blend(target.src_alpha),
                DestBlendAlpha: conv::blend(target.dst_alpha),
                BlendOpAlpha: conv::blend_op(target.alpha_op),
                LogicOp: D3D12_LOGIC_OP_NOOP,
                RenderTargetWriteMask: conv::color_write_mask(target.write_mask),
            };
        }

        let mut rtv_formats = [DXGI_FORMAT_UNKNOWN; 8];
        for (native, &format) in rtv_formats.iter_mut().zip(desc.render_target_formats) {
            *native = conv::format(format);
        }

        let pso_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: borrowed_root_signature(layout),
            VS: bytecode(Some(desc.vertex))?,
            PS: bytecode(desc.pixel)?,
            DS: bytecode(desc.domain)?,
            HS: bytecode(desc.hull)?,
            GS: bytecode(desc.geometry)?,
            BlendState: blend,
            SampleMask: u32::MAX,
            RasterizerState: rasterizer,
            DepthStencilState: depth_stencil,
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: if input_elements.is_empty() { std::ptr::null() } else { input_elements.as_ptr() },
                NumElements: input_elements.len() as u32,
            },
            PrimitiveTopologyType: conv::topology_type(input.topology),
            NumRenderTargets: desc.render_target_formats.len() as u32,
            RTVFormats: rtv_formats,
            DSVFormat: conv::format(desc.depth_stencil_format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count.max(1),
                Quality: 0,
            },
            ..Default::default()
        };

        let pipeline: ID3D12PipelineState =
            unsafe { device.handle().CreateGraphicsPipelineState(&pso_desc) }.context("CreateGraphicsPipelineState")?;
        set_debug_name(&pipeline, desc.name);

        Ok(Self {
            pipeline,
            root_signature: layout.handle().clone(),
            topology: conv::topology(input.topology),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12PipelineState {
        &self.pipeline
    }

    #[inline]
    pub(crate) fn root_signature(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }

    #[inline]
    pub(crate) fn topology(&self) -> D3D_PRIMITIVE_TOPOLOGY {
        self.topology
    }
}

pub struct Dx12ComputePipeline {
    pipeline: ID3D12PipelineState,
    root_signature: ID3D12RootSignature,
}

impl Dx12ComputePipeline {
    #[profiling::function]
    pub(crate) fn new(device: &Dx12Device, layout: &Dx12ResourceLayout, desc: &ComputePipelineDesc<'_>) -> RhiResult<Self> {
        let pso_desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: borrowed_root_signature(layout),
            CS: bytecode(Some(desc.compute))?,
            ..Default::default()
        };
        let pipeline: ID3D12PipelineState =
            unsafe { device.handle().CreateComputePipelineState(&pso_desc) }.context("CreateComputePipelineState")?;
        set_debug_name(&pipeline, desc.name);

        Ok(Self {
            pipeline,
            root_signature: layout.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12PipelineState {
        &self.pipeline
    }

    #[inline]
    pub(crate) fn root_signature(&self) -> &ID3D12RootSignature {
        &self.root_signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StencilOp;
    use crate::shader::ShaderType;
    use crate::types::CompareOp;

    #[test]
    fn stencil_faces_translate() {
        let face = StencilFaceState {
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Zero,
            pass: StencilOp::Replace,
            compare: CompareOp::Equal,
        };
        let native = stencil_face(&face);
        assert_eq!(native.StencilPassOp, D3D12_STENCIL_OP_REPLACE);
        assert_eq!(native.StencilFunc, D3D12_COMPARISON_FUNC_EQUAL);
    }

    #[test]
    fn spirv_is_rejected() {
        let blob = ShaderBlob::new(ShaderType::Vertex, "main", Default::default(), ShaderTarget::Spirv, vec![0; 4]);
        assert!(bytecode(Some(&blob)).is_err());
        assert_eq!(bytecode(None).map(|code| code.BytecodeLength).ok(), Some(0));
    }
}
