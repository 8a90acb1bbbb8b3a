use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("codec error: {message}")]
    Codec { message: String },
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl CacheError {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
