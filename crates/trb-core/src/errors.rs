use std::path::PathBuf;

/// Failure of a job submitted to the offload pool.
///
/// These never escape the translation handler: it turns them into a
/// user-visible failure reply.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OffloadError {
    #[error("worker failure: {0}")]
    WorkerFailure(String),

    #[error("offload pool unavailable")]
    PoolUnavailable,

    #[error("job cancelled")]
    Cancelled,
}

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core
/// can handle failures consistently. Only `Config` is allowed to terminate the
/// process; every other kind is contained where it is detected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("handler failure: {0}")]
    Handler(String),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigFile { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
