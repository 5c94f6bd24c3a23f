//! Rendering on top of `prism-rhi`: the [`LowLevelGraphicsEngine`] frame driver, the handle based
//! [`GpuRegistry`], scene and model data, and the passes of the [`UniversalRenderPipeline`].

pub mod engine;
pub mod error;
pub mod model;
pub mod passes;
pub mod registry;
pub mod scene;
pub mod shader;
pub mod urp;

pub use engine::{DefaultTextures, FrameRecorder, LowLevelGraphicsEngine, DEFAULT_TEXTURE_FORMAT, DEPTH_FORMAT};
pub use error::{RenderError, RenderResult};
pub use model::{GameModel, Material, MaterialConstants, MaterialDesc, Mesh, ModelDesc, ObjectConstants, SkinnedVertex};
pub use passes::{tile_count, CullingLightType, ForwardPass, GBuffer, GBufferType, LightCulling, ModelList, ZPrepass};
pub use registry::{
    BufferHandle, FrameBufferHandle, GpuRegistry, LayoutHandle, ModelHandle, RenderPassHandle, SamplerHandle,
    TextureHandle, ViewHandle,
};
pub use scene::{PointLight, SceneBuffers, SceneView, SpotLight, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS};
pub use shader::{ShaderLibrary, SHADER_DIR};
pub use urp::UniversalRenderPipeline;
