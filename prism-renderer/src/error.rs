use prism_rhi::RhiError;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),
    #[error("frame is {actual}, expected it to be {expected}")]
    FrameState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{kind} handle does not refer to a live object")]
    StaleHandle { kind: &'static str },
    #[error("{0} was used before it was prepared")]
    Unprepared(&'static str),
    #[error("invalid model `{name}`: {reason}")]
    InvalidModel { name: String, reason: String },
}
