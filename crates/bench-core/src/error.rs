use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid job space: {0}")]
    InvalidJobSpace(String),

    #[error("malformed adapter response: {0}")]
    MalformedResponse(String),

    #[error("negative duration: end {end} precedes reference {reference}")]
    NegativeDuration { reference: u64, end: u64 },

    #[error("invalid timestamp: {0}")]
    BadTimestamp(String),

    #[error("invalid sink document: {0}")]
    BadSink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
