use std::time::Duration;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("cache io error: {0}")]
    CacheIo(String),

    #[error("broker terminated: no further renders are accepted")]
    Terminated,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("render did not finish within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrokerError {
    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable(msg.into())
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn cache_io(msg: impl Into<String>) -> Self {
        Self::CacheIo(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a caller can reasonably retry after editing its input or waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Render(_) | Self::Timeout(_))
    }
}
