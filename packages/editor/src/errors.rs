//! Error types for the editor

use thiserror::Error;

/// An edit request that cannot be turned into a well-formed transaction.
/// The document is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Position {position} is outside the document (extent {extent})")]
    OutOfRange { position: usize, extent: usize },

    #[error("Source edit does not fit the document")]
    InvalidSourceEdit,

    #[error("Cannot split the atomic box at {position}")]
    SplitsAtomic { position: usize },

    #[error("Range {start}..{end} crosses a structural boundary")]
    CrossesStructure { start: usize, end: usize },

    #[error("Move target {target} lies inside the moved range")]
    TargetInsideRange { target: usize },

    #[error("Edit would introduce a new structural error: {message}")]
    IntroducesError { message: String },

    #[error("Mutation failed: {0}")]
    Mutation(#[from] crate::mutations::MutationError),
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Invalid edit: {0}")]
    Edit(#[from] EditError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] crate::mutations::MutationError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Background worker is gone")]
    WorkerGone,
}
