use thiserror::Error;

use crate::state::models::AnchorStatus;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access to subject denied")]
    Forbidden,

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AnchorStatus, to: AnchorStatus },

    #[error("No {flow} anchor transition leads to {to:?}")]
    UnreachableStatus { flow: &'static str, to: AnchorStatus },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnchorError>;
