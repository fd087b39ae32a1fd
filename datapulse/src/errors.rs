use thiserror::Error;

/// Unified error type for the SDK.
///
/// Every failure raised by the library falls into one of these seven kinds.
/// Messages name the component, the operation, and the condition; transport
/// failures chain their underlying cause.
#[derive(Error, Debug)]
pub enum DataPlatformError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("illegal state: {0}")]
    State(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("data anomaly: {0}")]
    Data(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl DataPlatformError {
    pub fn transport(message: impl Into<String>) -> Self {
        DataPlatformError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_caused_by(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DataPlatformError::Transport {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }
}

pub type Result<T, E = DataPlatformError> = std::result::Result<T, E>;
