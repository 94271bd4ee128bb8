use crate::validate::Mismatch;
use bench_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid plan {path}: {message}")]
    Plan { path: PathBuf, message: String },

    #[error("failed to start adapter for {framework}: {source}")]
    Spawn {
        framework: String,
        #[source]
        source: std::io::Error,
    },

    #[error("adapter for {framework} exited with status {status}: {command}")]
    AdapterFailed {
        framework: String,
        command: String,
        status: String,
    },

    #[error("adapter for {framework} timed out after {seconds}s: {command}")]
    Timeout {
        framework: String,
        command: String,
        seconds: u64,
    },

    #[error("malformed output from {framework} for {job}: {message}")]
    Malformed {
        framework: String,
        job: String,
        message: String,
    },

    #[error("the frameworks returned non-identical hashes for {}", .0.job)]
    Mismatch(Box<Mismatch>),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
