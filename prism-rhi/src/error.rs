use crate::types::{DescriptorHeapType, DescriptorType, ResourceViewType};
use crate::shader::ShaderType;

pub type RhiResult<T> = Result<T, RhiError>;

/// Errors raised at the render hardware interface boundary.
///
/// Native api failures during object creation are not recoverable: callers propagate them up
/// to the engine driver which logs and shuts the renderer down.
#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("{context} failed: {message}")]
    Backend {
        context: &'static str,
        message: String,
    },
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    #[error("no adapter is able to run the renderer")]
    NoSuitableAdapter,
    #[error("{heap:?} descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted {
        heap: DescriptorHeapType,
        capacity: u32,
    },
    #[error("invalid extent {width}x{height}")]
    InvalidExtent { width: u32, height: u32 },
    #[error("swapchain surface is out of date")]
    SurfaceOutOfDate,
    #[error("swapchain surface was lost")]
    SurfaceLost,
    #[error("fence value can not decrease from {current} to {requested}")]
    FenceValueDecreased { current: u64, requested: u64 },
    #[error("command list is {actual}, expected it to be {expected}")]
    InvalidCommandListState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("resource binding mismatch: {0}")]
    BindingMismatch(BindingMismatch),
    #[error("pipeline state has not been completed")]
    PipelineStateIncomplete,
    #[error("pipeline state is already completed and can not be modified")]
    PipelineStateAlreadyCompleted,
    #[error("pipeline state is missing a {0:?} shader")]
    MissingShader(ShaderType),
    #[error("expected a {expected:?} shader, got a {actual:?} shader")]
    ShaderStageMismatch {
        expected: ShaderType,
        actual: ShaderType,
    },
    #[error("shader compilation of {path} failed: {message}")]
    ShaderCompilation { path: String, message: String },
    #[error("shader model {requested} is newer than the supported {newest}")]
    ShaderModelUnsupported {
        requested: crate::shader::ShaderModel,
        newest: crate::shader::ShaderModel,
    },
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("resource is not visible to the cpu")]
    NotCpuVisible,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons why a view table does not match the resource layout it is bound against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingMismatch {
    Count { expected: usize, actual: usize },
    Type {
        slot: usize,
        expected: DescriptorType,
        actual: ResourceViewType,
    },
}

impl std::fmt::Display for BindingMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingMismatch::Count { expected, actual } => {
                write!(f, "layout expects {expected} views, got {actual}")
            }
            BindingMismatch::Type { slot, expected, actual } => {
                write!(f, "slot {slot} expects a {expected:?} descriptor, got a {actual:?} view")
            }
        }
    }
}

impl RhiError {
    pub fn backend(context: &'static str, message: impl std::fmt::Display) -> Self {
        RhiError::Backend {
            context,
            message: message.to_string(),
        }
    }
}

impl From<ash::vk::Result> for RhiError {
    fn from(result: ash::vk::Result) -> Self {
        match result {
            ash::vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutOfDate,
            ash::vk::Result::ERROR_SURFACE_LOST_KHR => RhiError::SurfaceLost,
            other => RhiError::backend("vulkan", other),
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for RhiError {
    fn from(error: windows::core::Error) -> Self {
        RhiError::backend("d3d12", error)
    }
}

/// Attach context to a native result, keeping the fatal error path terse at call sites.
pub(crate) trait ResultExt<T> {
    fn context(self, context: &'static str) -> RhiResult<T>;
}

impl<T> ResultExt<T> for Result<T, ash::vk::Result> {
    fn context(self, context: &'static str) -> RhiResult<T> {
        self.map_err(|result| match result {
            ash::vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutOfDate,
            ash::vk::Result::ERROR_SURFACE_LOST_KHR => RhiError::SurfaceLost,
            other => RhiError::backend(context, other),
        })
    }
}

#[cfg(windows)]
impl<T> ResultExt<T> for windows::core::Result<T> {
    fn context(self, context: &'static str) -> RhiResult<T> {
        self.map_err(|error| RhiError::backend(context, error))
    }
}
