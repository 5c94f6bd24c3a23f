use crate::format::PixelFormat;

/// One vertex attribute. DirectX12 matches it by semantic, Vulkan by location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic_name: &'static str,
    pub semantic_index: u32,
    pub format: PixelFormat,
    pub input_slot: u32,
    pub location: u32,
    pub offset: u32,
}

/// Vertex structs usable as pipeline input. Usually derived with `#[derive(VertexLayout)]`.
pub trait VertexLayout {
    fn stride() -> u32;
    fn input_elements() -> Vec<InputElement>;
}
