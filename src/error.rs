//! Error types for the pipeline surface.
//!
//! Store failures are fatal for a batch: classification cannot proceed
//! safely without cache consistency, so they propagate to the caller
//! instead of being swallowed. Classification ambiguity is never an error
//! (it yields the `UNKNOWN` sentinel).

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// Deduplication was invoked with zero candidates. The caller must
    /// partition candidates before selection; an empty group is a contract
    /// violation, not a recoverable runtime condition.
    #[error("select_canonical called with an empty candidate group")]
    EmptyCandidateGroup,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for errors that indicate a bug in the calling code rather than
    /// a runtime failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::EmptyCandidateGroup)
    }
}
