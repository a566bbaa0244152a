use thiserror::Error;

/// Errors surfaced by the rPPG pipeline.
///
/// Every *recoverable* condition (no face, lost tracking, degenerate
/// affine estimate) is a state transition, not one of these -- `load`
/// (and its collaborators' own constructors) is the only place a caller
/// sees a `Result`. `process_frame` is infallible: a genuine I/O/FFI
/// failure from a vision or logging collaborator is caught internally,
/// logged, and downgraded to an invalidated face rather than propagated.
#[derive(Debug, Error)]
pub enum RppgError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("vision backend error: {0}")]
    Vision(String),
}

impl From<opencv::Error> for RppgError {
    fn from(e: opencv::Error) -> Self {
        RppgError::Vision(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RppgError>;
