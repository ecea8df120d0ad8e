use crate::DocId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the indexing and retrieval core.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// `add_document` was called twice for the same id.
    #[error("document {0} is already indexed")]
    DuplicateDocument(DocId),
    /// Retrieval mode string did not name a known mode.
    #[error("unknown search mode: {0:?} (expected vector, boolean_and or boolean_or)")]
    UnknownSearchMode(String),
    /// TF normalization string did not name a known mode.
    #[error("unknown tf mode: {0:?} (expected normalized, log or raw)")]
    UnknownTfMode(String),
    /// `evaluate_system` needs at least one query.
    #[error("cannot aggregate metrics over an empty query set")]
    EmptyEvaluation,
    /// A configuration value was out of range.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),
}
