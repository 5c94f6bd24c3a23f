use enumflags2::{bitflags, BitFlags};

/// How a resource is going to be used by the pipeline.
#[bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    ConstantBuffer = 1 << 0,
    VertexBuffer = 1 << 1,
    IndexBuffer = 1 << 2,
    ShaderResource = 1 << 3,
    UnorderedAccess = 1 << 4,
    RenderTarget = 1 << 5,
    DepthStencil = 1 << 6,
    CopySource = 1 << 7,
    CopyDestination = 1 << 8,
    AccelerationStructure = 1 << 9,
}

pub type ResourceUsages = BitFlags<ResourceUsage>;

/// Where the memory of a buffer lives and how the cpu accesses it.
#[bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferCreateFlags {
    /// Cpu writes, gpu reads. Mapped on demand.
    CpuAccess = 1 << 0,
    /// Cpu reads back gpu results.
    Readback = 1 << 1,
    /// Elements are addressed as a structured buffer.
    Structured = 1 << 2,
    /// Raw byte address buffer.
    Raw = 1 << 3,
}

pub type BufferCreateFlagSet = BitFlags<BufferCreateFlags>;

#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorMask {
    Red = 1 << 0,
    Green = 1 << 1,
    Blue = 1 << 2,
    Alpha = 1 << 3,
}

pub type ColorMasks = BitFlags<ColorMask>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_with_bit_or() {
        let usage = ResourceUsage::RenderTarget | ResourceUsage::ShaderResource;
        assert!(usage.contains(ResourceUsage::RenderTarget));
        assert!(usage.contains(ResourceUsage::ShaderResource));
        assert!(!usage.contains(ResourceUsage::DepthStencil));

        let mask: ColorMasks = BitFlags::all();
        assert_eq!(mask.bits(), 0b1111);
    }
}
