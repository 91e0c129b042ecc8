use thiserror::Error;

/// Failure of a whole analysis request. Silence is never reported here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any processing (empty waveform, bad tempo grid).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The uploaded bytes could not be turned into a waveform.
    #[error("decode error: {0}")]
    Decode(String),

    /// An external capability (onset detector, pitch tracker, classifier, audit sink) failed.
    #[error("{capability} unavailable: {source}")]
    Capability {
        capability: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn capability(capability: &'static str, source: anyhow::Error) -> Self {
        EngineError::Capability { capability, source }
    }

    /// True when the caller sent bad audio or parameters, false when a model or sink failed.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_) | EngineError::Decode(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
