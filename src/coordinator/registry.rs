use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex, RwLock};

use crate::errors::{Result, TmError};
use crate::participant::{Enlistment, ParticipantId};
use crate::storage::LogStore;
use crate::{TxnStatus, Xid};

/// In-memory state of one tracked transaction.
#[derive(Debug)]
pub(crate) struct TxnState {
    status: TxnStatus,
    participants: Vec<Enlistment>,
    /// Set once the entry has been erased; a guard that raced with the removal
    /// observes the transaction as absent.
    removed: bool,
}

/// Authoritative xid -> status and xid -> participants tables, mirrored to the
/// log store.
///
/// Every transaction has its own lock. The map lock is only taken to insert or
/// erase an entry and is never held across I/O or participant calls; the
/// counter lock serializes allocation.
pub struct TransactionRegistry {
    store: Arc<dyn LogStore>,
    next_xid: Mutex<Xid>,
    transactions: RwLock<HashMap<Xid, Arc<Mutex<TxnState>>>>,
}

impl TransactionRegistry {
    /// Creates a registry that hands out xids starting at `next_xid`.
    pub fn new(store: Arc<dyn LogStore>, next_xid: Xid) -> Self {
        Self {
            store,
            next_xid: Mutex::new(next_xid.max(1)),
            transactions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a fresh `NEW` transaction with no participants.
    ///
    /// The counter, the status entry and the empty enlistment entry are made
    /// durable in that order before the transaction becomes visible.
    pub fn allocate(&self) -> Result<Xid> {
        let mut next_xid = self.next_xid.lock();
        let xid = *next_xid;

        self.store.write_counter(xid + 1)?;
        *next_xid = xid + 1;

        self.store.write_status(xid, TxnStatus::New)?;
        self.store.write_enlistments(xid, &[])?;

        let state = TxnState {
            status: TxnStatus::New,
            participants: Vec::new(),
            removed: false,
        };
        self.transactions
            .write()
            .insert(xid, Arc::new(Mutex::new(state)));

        debug!("Allocated transaction {}", xid);
        Ok(xid)
    }

    /// Puts a transaction read back from the log store under management
    /// without writing anything.
    pub(crate) fn restore(&self, xid: Xid, status: TxnStatus, participants: Vec<Enlistment>) {
        let state = TxnState {
            status,
            participants,
            removed: false,
        };
        self.transactions
            .write()
            .insert(xid, Arc::new(Mutex::new(state)));
    }

    /// Locks `xid` for the duration of the returned guard.
    ///
    /// Returns `None` if the transaction is not tracked.
    pub fn open(&self, xid: Xid) -> Option<TxnGuard<'_>> {
        let entry = self.transactions.read().get(&xid).cloned()?;
        let state = entry.lock_arc();
        if state.removed {
            return None;
        }
        Some(TxnGuard {
            registry: self,
            xid,
            state,
        })
    }

    pub fn lookup_status(&self, xid: Xid) -> Option<TxnStatus> {
        self.open(xid).map(|txn| txn.status())
    }

    /// Identities currently enlisted in `xid`, in enlistment order.
    pub fn lookup_participants(&self, xid: Xid) -> Option<Vec<ParticipantId>> {
        self.open(xid).map(|txn| txn.participant_ids())
    }

    pub fn mutate_status(&self, xid: Xid, status: TxnStatus) -> Result<()> {
        let mut txn = self.open(xid).ok_or(TmError::InvalidTransaction(xid))?;
        txn.mutate_status(status)
    }

    pub fn mutate_participants<F>(&self, xid: Xid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Enlistment>),
    {
        let mut txn = self.open(xid).ok_or(TmError::InvalidTransaction(xid))?;
        txn.mutate_participants(f)
    }

    pub fn remove(&self, xid: Xid) -> Result<()> {
        let txn = self.open(xid).ok_or(TmError::InvalidTransaction(xid))?;
        txn.remove()
    }

    /// Whether `xid` was ever handed out by this registry or a predecessor
    /// whose log it recovered.
    pub fn was_issued(&self, xid: Xid) -> bool {
        xid > 0 && xid < *self.next_xid.lock()
    }

    /// The xid the next `allocate` will return.
    pub fn next_xid(&self) -> Xid {
        *self.next_xid.lock()
    }

    /// Snapshot of the xids currently tracked, in ascending order.
    pub fn tracked_xids(&self) -> Vec<Xid> {
        let mut xids: Vec<Xid> = self.transactions.read().keys().copied().collect();
        xids.sort_unstable();
        xids
    }
}

/// Exclusive access to one tracked transaction.
///
/// All mutations go through the guard and are durable before they are applied
/// in memory, so no other caller can observe state the log does not hold.
pub struct TxnGuard<'a> {
    registry: &'a TransactionRegistry,
    xid: Xid,
    state: ArcMutexGuard<RawMutex, TxnState>,
}

impl TxnGuard<'_> {
    pub fn xid(&self) -> Xid {
        self.xid
    }

    pub fn status(&self) -> TxnStatus {
        self.state.status
    }

    pub fn participants(&self) -> &[Enlistment] {
        &self.state.participants
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.state
            .participants
            .iter()
            .map(|enlisted| enlisted.id.clone())
            .collect()
    }

    pub fn mutate_status(&mut self, status: TxnStatus) -> Result<()> {
        self.registry.store.write_status(self.xid, status)?;
        debug!(
            "Transaction {} {} -> {}",
            self.xid, self.state.status, status
        );
        self.state.status = status;
        Ok(())
    }

    pub fn mutate_participants<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Enlistment>),
    {
        let mut participants = self.state.participants.clone();
        f(&mut participants);

        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id.clone()).collect();
        self.registry.store.write_enlistments(self.xid, &ids)?;

        self.state.participants = participants;
        Ok(())
    }

    /// Erases the transaction from both logs and from memory.
    pub fn remove(mut self) -> Result<()> {
        self.registry.store.remove_transaction(self.xid)?;
        self.state.removed = true;
        self.registry.transactions.write().remove(&self.xid);
        debug!("Transaction {} resolved and removed", self.xid);
        Ok(())
    }
}
