use thiserror::Error;

use crate::Xid;

#[derive(Error, Debug)]
pub enum TmError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(Xid),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(Xid),

    #[error("Participant unreachable: {0}")]
    ParticipantUnreachable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, TmError>;
