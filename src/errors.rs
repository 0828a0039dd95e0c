use thiserror::Error;

/// Classification of an options decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    UnknownField,
    TypeMismatch,
    MissingField,
    Malformed,
}

/// The options value could not be decoded into `QueryOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub reason: String,
}

impl DecodeError {
    /// Builds a decode error from a deserializer message, classifying it by the serde wording.
    pub fn from_message(msg: impl Into<String>) -> Self {
        let reason = msg.into();
        let kind = if reason.contains("unknown field") {
            DecodeErrorKind::UnknownField
        } else if reason.contains("missing field") {
            DecodeErrorKind::MissingField
        } else if reason.contains("invalid type") || reason.contains("invalid value") {
            DecodeErrorKind::TypeMismatch
        } else {
            DecodeErrorKind::Malformed
        };
        Self { kind, reason }
    }
}

/// Failures of the compiled-query execution path. None of them carry a partial result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("cursor open failed: {0}")]
    Open(String),

    #[error("record {index} failed to decode: {reason}")]
    Decode { index: usize, reason: String },

    #[error("cursor stream failed: {0}")]
    Stream(String),

    #[error("deadline exceeded after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Options decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Query compile error: {0}")]
    Compile(String),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
