//! Error types for loading, saving and configuring graphs.

use thiserror::Error;

/// Errors surfaced by data, storage and config boundaries.
///
/// Graph mutation through handles does not fail with an `Error`: access to
/// destroyed objects is governed by [`EngineConfig::strict`](crate::EngineConfig).
#[derive(Error, Debug)]
pub enum Error {
    /// Flow data did not have the expected shape.
    #[error("invalid flow data: {0}")]
    InvalidData(String),

    /// A job name was not found in storage.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
