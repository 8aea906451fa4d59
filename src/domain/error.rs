use thiserror::Error;

/// Failures surfaced by the wall engine.
#[derive(Debug, Error)]
pub enum MuralError {
    /// Rejected locally, no network call was made.
    #[error("{0}")]
    Validation(String),

    #[error("store write failed: {0}")]
    StoreWrite(#[source] anyhow::Error),

    #[error("live feed unavailable: {0}")]
    StoreSubscription(#[source] anyhow::Error),

    #[error("post {0} not found")]
    NotFound(String),

    #[error("edit window closed for post {0}")]
    EditWindowClosed(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("delete requires confirmation")]
    Unconfirmed,

    /// Another operation of the same kind is still running.
    #[error("{0} already in progress")]
    InFlight(&'static str),

    /// Deleting a thread left some replies behind.
    #[error("failed to delete {failed} of {total} replies")]
    PartialDelete { failed: usize, total: usize },
}

impl MuralError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type MuralResult<T> = std::result::Result<T, MuralError>;
