use thiserror::Error;

/// Everything the policy engine can reject or fail on.
///
/// Validation errors (`EmptyMask`, `InvalidPid`, `InvalidPriority`, `CoreOutOfRange`,
/// `InvalidMask`) are decided before anything reaches the OS. Dispatch, side-effect and
/// enumeration failures are soft: they are logged and retried on a later tick.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("affinity mask is empty")]
    EmptyMask,

    #[error("invalid pid {0}")]
    InvalidPid(u32),

    #[error("invalid priority class '{0}'")]
    InvalidPriority(String),

    #[error("core index {index} exceeds the supported maximum of {max} cores")]
    CoreOutOfRange { index: usize, max: usize },

    #[error("invalid affinity mask '{0}'")]
    InvalidMask(String),

    #[error("dispatch to pid {pid} failed: {reason}")]
    DispatchFailed { pid: u32, reason: String },

    #[error("process enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("{action} failed: {reason}")]
    SideEffectFailed { action: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PolicyError {
    /// Whether the affected pid stays eligible for another attempt on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PolicyError::DispatchFailed { .. }
                | PolicyError::SideEffectFailed { .. }
                | PolicyError::EnumerationFailed(_)
        )
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
