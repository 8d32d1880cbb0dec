use thiserror::Error;

/// How a remote failure was classified at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Quota exceeded, too many requests, or the server reports overload.
    RateLimited,
    /// Anything else the remote call produced.
    Other,
}

/// Backoff class used by the retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Other,
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Malformed batch JSON: {0}")]
    MalformedJson(String),

    #[error("Remote model error: {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("Batch failed after {attempts} attempts: {source}")]
    BatchExhausted {
        attempts: u32,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("Could not produce {target} scenes after {failures} consecutive failed batches ({produced} accepted)")]
    GenerationExhausted {
        target: usize,
        produced: usize,
        failures: u32,
    },

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ScriptError {
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Backoff class for this failure. Only failures classified as rate
    /// limiting by the remote client get the long pause.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ScriptError::Remote {
                kind: RemoteErrorKind::RateLimited,
                ..
            } => FailureClass::RateLimited,
            ScriptError::BatchExhausted { source, .. } => source.failure_class(),
            _ => FailureClass::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
