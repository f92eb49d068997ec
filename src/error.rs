use thiserror::Error;

use crate::types::MatchId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("M{from} cannot advance: no target for {target}")]
    AdvancementTargetNotFound { from: MatchId, target: String },

    #[error("placeholder `{placeholder}` refers to a match that does not exist")]
    UnknownPlaceholderSource { placeholder: String },

    #[error("invalid placeholder `{0}`")]
    InvalidPlaceholder(String),

    #[error("invalid destination `{0}`")]
    InvalidDestination(String),

    #[error("result of M{match_id} was already played on in M{downstream}")]
    OutcomeLocked { match_id: MatchId, downstream: MatchId },
}

pub type BracketResult<T> = Result<T, BracketError>;
