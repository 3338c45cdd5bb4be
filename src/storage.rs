use std::collections::BTreeMap;

use crate::errors::Result;
use crate::participant::ParticipantId;
use crate::{TxnStatus, Xid};

/// The three logical logs the coordinator persists.
///
/// Each logical log mirrors one in-memory table. After any write returns, the
/// log wholly and exclusively reflects that table as it stood at the moment of
/// the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogName {
    /// Single integer: the next xid to hand out.
    TransactionCounter,
    /// xid -> status.
    Statuses,
    /// xid -> enlisted participant identities, in enlistment order.
    Enlistments,
}

impl LogName {
    pub const ALL: [LogName; 3] = [
        LogName::TransactionCounter,
        LogName::Statuses,
        LogName::Enlistments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogName::TransactionCounter => "tm_xidNum",
            LogName::Statuses => "tm_xids",
            LogName::Enlistments => "tm_xidRMs",
        }
    }
}

/// Everything the coordinator persisted, as read back at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    /// Persisted allocation counter, `None` if it was never written.
    pub next_xid: Option<Xid>,
    pub statuses: BTreeMap<Xid, TxnStatus>,
    pub enlistments: BTreeMap<Xid, Vec<ParticipantId>>,
}

impl LogSnapshot {
    /// Highest xid that appears in either table.
    pub fn highest_xid(&self) -> Option<Xid> {
        let status_max = self.statuses.keys().next_back().copied();
        let enlist_max = self.enlistments.keys().next_back().copied();
        status_max.max(enlist_max)
    }
}

/// Durable storage for the coordinator's logical logs.
///
/// Writes must be durable when the call returns: the coordinator exposes a
/// state change to other callers only after the corresponding write succeeded.
/// Writes for different xids may be issued concurrently; writes for the same
/// xid are always serialized by the caller.
///
/// Implementations must be `Send` and `Sync`.
///
/// # Examples
///
/// An in-memory store, useful when durability across processes is not needed:
///
/// ```no_run
/// use parking_lot::Mutex;
/// use tmcoord::prelude::*;
///
/// #[derive(Default)]
/// struct VolatileStore {
///     snapshot: Mutex<LogSnapshot>,
/// }
///
/// impl LogStore for VolatileStore {
///     fn write_counter(&self, next_xid: Xid) -> Result<()> {
///         self.snapshot.lock().next_xid = Some(next_xid);
///         Ok(())
///     }
///
///     fn write_status(&self, xid: Xid, status: TxnStatus) -> Result<()> {
///         self.snapshot.lock().statuses.insert(xid, status);
///         Ok(())
///     }
///
///     fn write_enlistments(&self, xid: Xid, participants: &[ParticipantId]) -> Result<()> {
///         self.snapshot.lock().enlistments.insert(xid, participants.to_vec());
///         Ok(())
///     }
///
///     fn remove_transaction(&self, xid: Xid) -> Result<()> {
///         let mut snapshot = self.snapshot.lock();
///         snapshot.enlistments.remove(&xid);
///         snapshot.statuses.remove(&xid);
///         Ok(())
///     }
///
///     fn load(&self) -> Result<LogSnapshot> {
///         Ok(self.snapshot.lock().clone())
///     }
/// }
/// ```
pub trait LogStore: Send + Sync {
    /// Overwrites the transaction counter log.
    fn write_counter(&self, next_xid: Xid) -> Result<()>;

    /// Sets `xid`'s entry in the status log.
    fn write_status(&self, xid: Xid, status: TxnStatus) -> Result<()>;

    /// Sets `xid`'s entry in the enlistment log to exactly `participants`.
    fn write_enlistments(&self, xid: Xid, participants: &[ParticipantId]) -> Result<()>;

    /// Erases `xid` from both the enlistment and the status log.
    fn remove_transaction(&self, xid: Xid) -> Result<()>;

    /// Reads back all three logical logs.
    fn load(&self) -> Result<LogSnapshot>;
}
