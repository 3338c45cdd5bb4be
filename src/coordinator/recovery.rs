//! Startup replay of the coordinator's logical logs.
//!
//! Every transaction found in the logs is pushed to a terminal outcome before
//! the coordinator serves its first call:
//!
//! * `NEW` and `PREPARED` had no durable decision, so they are aborted;
//! * `COMMITTED` re-drives commit to the residual participants;
//! * `ABORTED` re-drives abort to the residual participants.
//!
//! Participants that acknowledged before the crash were already dropped from
//! the enlistment log, so replay is idempotent from their point of view.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{info, warn};

use crate::coordinator::fault::{DieTime, Terminator};
use crate::coordinator::{Coordinator, Decision};
use crate::errors::Result;
use crate::participant::{Enlistment, ParticipantDirectory};
use crate::storage::LogStore;
use crate::{TxnStatus, Xid};

/// What recovery did with each transaction it found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Transactions that had no durable decision and were aborted.
    pub aborted_undecided: Vec<Xid>,
    /// Committed transactions whose residual participants all acknowledged.
    pub committed: Vec<Xid>,
    /// Aborted transactions whose residual participants all acknowledged.
    pub aborted: Vec<Xid>,
    /// Transactions still waiting on unreachable participants.
    pub pending: Vec<Xid>,
    /// The xid the recovered coordinator will hand out next.
    pub next_xid: Xid,
}

impl Coordinator {
    /// Rebuilds a coordinator from `store` and resolves everything it finds.
    pub fn recover(
        store: Arc<dyn LogStore>,
        directory: &dyn ParticipantDirectory,
        die_time: DieTime,
        terminator: Arc<dyn Terminator>,
    ) -> Result<(Self, RecoveryReport)> {
        let snapshot = store.load()?;

        let next_xid = snapshot
            .next_xid
            .unwrap_or(1)
            .max(snapshot.highest_xid().map_or(1, |xid| xid + 1))
            .max(1);
        if snapshot.next_xid != Some(next_xid) {
            store.write_counter(next_xid)?;
        }

        let coordinator = Self::new(Arc::clone(&store), next_xid, die_time, terminator);

        let xids: BTreeSet<Xid> = snapshot
            .statuses
            .keys()
            .chain(snapshot.enlistments.keys())
            .copied()
            .collect();

        let mut undecided = BTreeSet::new();
        for &xid in &xids {
            let status = match snapshot.statuses.get(&xid) {
                Some(status) => *status,
                None => {
                    warn!("Transaction {} has enlistments but no status, treating as aborted", xid);
                    store.write_status(xid, TxnStatus::Aborted)?;
                    TxnStatus::Aborted
                }
            };
            let ids = match snapshot.enlistments.get(&xid) {
                Some(ids) => ids.clone(),
                None => {
                    warn!("Transaction {} has a status but no enlistments", xid);
                    store.write_enlistments(xid, &[])?;
                    Vec::new()
                }
            };
            if !status.is_terminal() {
                undecided.insert(xid);
            }

            let participants = ids
                .into_iter()
                .map(|id| {
                    let handle = directory.resolve(&id);
                    Enlistment::new(id, handle)
                })
                .collect();
            coordinator.registry.restore(xid, status, participants);
        }

        let mut report = RecoveryReport {
            next_xid,
            ..RecoveryReport::default()
        };

        for xid in xids {
            let Some(txn) = coordinator.registry.open(xid) else {
                continue;
            };
            let status = txn.status();
            let resolved = match status {
                TxnStatus::New | TxnStatus::Prepared => coordinator.abort_locked(txn)?,
                TxnStatus::Committed => coordinator.deliver(txn, Decision::Commit)?,
                TxnStatus::Aborted => coordinator.deliver(txn, Decision::Abort)?,
            };

            if undecided.contains(&xid) {
                report.aborted_undecided.push(xid);
            }
            if !resolved {
                report.pending.push(xid);
            } else if status == TxnStatus::Committed {
                report.committed.push(xid);
            } else if !undecided.contains(&xid) {
                report.aborted.push(xid);
            }
        }

        info!(
            "Recovery finished: {} undecided aborted, {} committed, {} aborted, {} pending, \
             next xid {}",
            report.aborted_undecided.len(),
            report.committed.len(),
            report.aborted.len(),
            report.pending.len(),
            report.next_xid
        );

        Ok((coordinator, report))
    }
}
