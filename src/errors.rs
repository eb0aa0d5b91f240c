use thiserror::Error;

/// Everything that can go wrong on either side of the engine boundary.
#[derive(Debug, Error)]
pub enum JsonnetError {
    /// The engine rejected the program: syntax, type or runtime errors, stack
    /// overflow, failed imports and failed native callbacks all land here.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The formatter could not parse its input.
    #[error("format error: {0}")]
    Format(String),

    /// A host string carries an interior NUL byte and cannot be handed to the engine.
    #[error("{what} contains an interior NUL byte at offset {offset}")]
    Nul { what: String, offset: usize },

    #[error("invalid native function registration: {0}")]
    Registration(String),

    #[error("the engine could not allocate a context")]
    OutOfMemory,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl JsonnetError {
    pub(crate) fn nul(what: impl Into<String>, err: &std::ffi::NulError) -> Self {
        JsonnetError::Nul { what: what.into(), offset: err.nul_position() }
    }

    /// The engine's message, without the category prefix.
    pub fn message(&self) -> String {
        match self {
            JsonnetError::Evaluation(m)
            | JsonnetError::Format(m)
            | JsonnetError::Registration(m)
            | JsonnetError::Config(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JsonnetError>;
