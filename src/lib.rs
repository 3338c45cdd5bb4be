pub mod errors;
pub mod participant;
pub mod storage;
pub mod coordinator;
pub mod tm;

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export key types and structs for easier access
pub use errors::{Result, TmError};
pub use participant::{
    Enlistment, ParticipantDirectory, ParticipantError, ParticipantId, ParticipantResult,
    ResourceManager,
};
pub use storage::{LogName, LogSnapshot, LogStore};
pub use coordinator::config::TmConfig;
pub use coordinator::fault::{DieTime, ProcessExit, Terminator};
pub use coordinator::recovery::RecoveryReport;
#[cfg(feature = "durable")]
pub use coordinator::rocks_store::RocksLogStore;
pub use tm::{TransactionManager, prelude};

/// Transaction identifier. Positive, strictly increasing, never reused.
pub type Xid = u64;

/// Lifecycle status of a transaction tracked by the coordinator.
///
/// A transaction that is not tracked at all has either never been created or
/// has been fully resolved and collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnStatus {
    /// Created by `start`, participants may still enlist.
    New,
    /// Every participant voted yes; the commit decision is not yet durable.
    Prepared,
    /// The commit decision is durable. Residual participants still have to hear it.
    Committed,
    /// The abort decision is durable. Residual participants still have to hear it.
    Aborted,
}

impl TxnStatus {
    /// `true` once a decision has been recorded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxnStatus::Committed | TxnStatus::Aborted)
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxnStatus::New => "NEW",
            TxnStatus::Prepared => "PREPARED",
            TxnStatus::Committed => "COMMITTED",
            TxnStatus::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}
