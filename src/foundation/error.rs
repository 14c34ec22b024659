pub type HandoffResult<T> = Result<T, HandoffError>;

#[derive(thiserror::Error, Debug)]
pub enum HandoffError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("gpu context lost: {0}")]
    ContextLost(String),

    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("contract violation: {0}")]
    Contract(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandoffError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn context_lost(msg: impl Into<String>) -> Self {
        Self::ContextLost(msg.into())
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for failures that a caller may answer by falling back to CPU rendering.
    pub fn is_gpu_failure(&self) -> bool {
        matches!(self, Self::ContextLost(_) | Self::Allocation(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
