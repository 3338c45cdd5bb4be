use std::sync::Arc;

use futures::executor::block_on;
use futures::future::join_all;
use log::{debug, warn};

use crate::coordinator::registry::TxnGuard;
use crate::coordinator::{Coordinator, Decision};
use crate::errors::{Result, TmError};
use crate::participant::{Enlistment, ResourceManager};
use crate::{DieTime, TxnStatus, Xid};

impl Coordinator {
    /// Runs two-phase commit for `xid`.
    ///
    /// Returns `Ok(true)` as soon as `COMMITTED` is durable, whether or not
    /// every participant has acknowledged the commit yet. Participants that
    /// did not acknowledge stay tracked until an enlistment, the retrier or a
    /// restart delivers the decision to them.
    ///
    /// # Errors
    ///
    /// * `InvalidTransaction` if `xid` was never issued.
    /// * `TransactionAborted` if `xid` is no longer tracked, was already
    ///   aborted, or any participant vetoed or could not be reached during
    ///   prepare. In the latter case the transaction has been aborted.
    pub fn commit(&self, xid: Xid) -> Result<bool> {
        let Some(mut txn) = self.registry.open(xid) else {
            return Err(self.unknown_on_commit(xid));
        };

        match txn.status() {
            TxnStatus::Committed => return Ok(true),
            TxnStatus::Aborted => return Err(TmError::TransactionAborted(xid)),
            TxnStatus::New | TxnStatus::Prepared => {}
        }

        if !prepare_all(xid, txn.participants()) {
            debug!("Transaction {} vetoed during prepare", xid);
            self.abort_locked(txn)?;
            return Err(TmError::TransactionAborted(xid));
        }

        txn.mutate_status(TxnStatus::Prepared)?;
        self.faults.checkpoint(DieTime::BeforeCommit);

        txn.mutate_status(TxnStatus::Committed)?;
        self.faults.checkpoint(DieTime::AfterCommit);

        // The decision stands; leftover cleanup is finished by a later re-drive.
        if let Err(e) = self.deliver(txn, Decision::Commit) {
            warn!("Transaction {} committed but cleanup failed: {}", xid, e);
        }
        Ok(true)
    }

    /// Aborts `xid` and tells every participant.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` if `xid` is not tracked or has already committed.
    pub fn abort(&self, xid: Xid) -> Result<()> {
        let txn = self
            .registry
            .open(xid)
            .ok_or(TmError::InvalidTransaction(xid))?;

        if txn.status() == TxnStatus::Committed {
            return Err(TmError::InvalidTransaction(xid));
        }

        self.abort_locked(txn)?;
        Ok(())
    }

    /// Records `ABORTED` (if not already recorded) and notifies participants.
    pub(crate) fn abort_locked(&self, mut txn: TxnGuard<'_>) -> Result<bool> {
        if txn.status() != TxnStatus::Aborted {
            txn.mutate_status(TxnStatus::Aborted)?;
        }
        self.deliver(txn, Decision::Abort)
    }

    /// Sends `decision` to every tracked participant of `txn`.
    ///
    /// Participants that acknowledge are dropped from the pending set; once
    /// the set is empty the transaction is removed. Returns `true` if the
    /// transaction is fully resolved.
    pub(crate) fn deliver(&self, mut txn: TxnGuard<'_>, decision: Decision) -> Result<bool> {
        let xid = txn.xid();
        let acks = notify_all(xid, decision, txn.participants());

        if acks.iter().all(|acked| *acked) {
            txn.remove()?;
            return Ok(true);
        }

        let pending: Vec<Enlistment> = txn
            .participants()
            .iter()
            .zip(&acks)
            .filter(|(_, acked)| !**acked)
            .map(|(enlisted, _)| enlisted.clone())
            .collect();

        debug!(
            "Transaction {} left {} of {} participants pending {:?}",
            xid,
            pending.len(),
            acks.len(),
            decision
        );

        if pending.len() != acks.len() {
            txn.mutate_participants(|participants| *participants = pending)?;
        }
        Ok(false)
    }

    /// Re-sends the recorded decision to residual participants of every
    /// terminal transaction. Returns how many transactions became resolved.
    ///
    /// A failing transaction does not stop the pass; the first error is
    /// returned once every transaction has been visited.
    pub fn redrive_pending(&self) -> Result<usize> {
        let mut resolved = 0;
        let mut first_error = None;
        for xid in self.registry.tracked_xids() {
            let Some(txn) = self.registry.open(xid) else {
                continue;
            };
            let decision = match txn.status() {
                TxnStatus::Committed => Decision::Commit,
                TxnStatus::Aborted => Decision::Abort,
                TxnStatus::New | TxnStatus::Prepared => continue,
            };
            match self.deliver(txn, decision) {
                Ok(true) => resolved += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Re-drive of transaction {} failed: {}", xid, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(resolved),
        }
    }

    fn unknown_on_commit(&self, xid: Xid) -> TmError {
        if self.registry.was_issued(xid) {
            TmError::TransactionAborted(xid)
        } else {
            TmError::InvalidTransaction(xid)
        }
    }
}

/// Phase 1 fan-out. `true` only if every participant voted yes.
pub(crate) fn prepare_all(xid: Xid, participants: &[Enlistment]) -> bool {
    let votes = block_on(join_all(
        participants
            .iter()
            .map(|enlisted| enlisted.handle.prepare(xid)),
    ));

    let mut all_prepared = true;
    for (enlisted, vote) in participants.iter().zip(votes) {
        match vote {
            Ok(true) => {}
            Ok(false) => {
                debug!("Participant {} voted no on {}", enlisted.id, xid);
                all_prepared = false;
            }
            Err(e) => {
                warn!("Participant {} failed to prepare {}: {}", enlisted.id, xid, e);
                all_prepared = false;
            }
        }
    }
    all_prepared
}

/// Phase 2 fan-out. One acknowledgement flag per participant, in order.
pub(crate) fn notify_all(xid: Xid, decision: Decision, participants: &[Enlistment]) -> Vec<bool> {
    block_on(join_all(participants.iter().map(|enlisted| async move {
        match send(&enlisted.handle, xid, decision).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Participant {} did not acknowledge {:?} of {}: {}",
                    enlisted.id, decision, xid, e
                );
                false
            }
        }
    })))
}

/// Delivers `decision` to a single participant. `true` if acknowledged.
pub(crate) fn notify_one(
    xid: Xid,
    decision: Decision,
    participant: &Arc<dyn ResourceManager>,
) -> bool {
    match block_on(send(participant, xid, decision)) {
        Ok(()) => true,
        Err(e) => {
            warn!("Participant did not acknowledge {:?} of {}: {}", decision, xid, e);
            false
        }
    }
}

async fn send(
    participant: &Arc<dyn ResourceManager>,
    xid: Xid,
    decision: Decision,
) -> crate::participant::ParticipantResult<()> {
    match decision {
        Decision::Commit => participant.commit(xid).await,
        Decision::Abort => participant.abort(xid).await,
    }
}
