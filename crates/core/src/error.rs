use thiserror::Error;

/// Failures surfaced at the service boundary. Storage and HTTP clients below this layer
/// return `anyhow::Result`; they are folded into `Downstream` here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error(transparent)]
    Downstream(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
