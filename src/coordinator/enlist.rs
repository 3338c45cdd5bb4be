use std::sync::Arc;

use futures::executor::block_on;
use log::{debug, warn};

use crate::coordinator::registry::TxnGuard;
use crate::coordinator::twopc::notify_one;
use crate::coordinator::{Coordinator, Decision};
use crate::errors::{Result, TmError};
use crate::participant::{Enlistment, ParticipantId, ResourceManager};
use crate::{TxnStatus, Xid};

/// What the identity probe over the current participants found.
enum Probe {
    AlreadyEnlisted,
    NotEnlisted,
    /// A previously enlisted participant could not even report its identity.
    DeadParticipant,
}

impl Coordinator {
    /// Registers `participant` as doing work for `xid`.
    ///
    /// A participant that enlists in a transaction whose outcome is already
    /// decided (or forgotten) is told that outcome instead of being added.
    ///
    /// # Errors
    ///
    /// * `InvalidTransaction` if `xid` was never issued. The participant has
    ///   still been told to abort.
    /// * `ParticipantUnreachable` if the participant cannot report its own
    ///   identity; nothing is changed.
    pub fn enlist(&self, xid: Xid, participant: Arc<dyn ResourceManager>) -> Result<()> {
        let Some(txn) = self.registry.open(xid) else {
            debug!("Enlistment in unknown transaction {}, aborting caller", xid);
            notify_one(xid, Decision::Abort, &participant);
            if self.registry.was_issued(xid) {
                return Ok(());
            }
            return Err(TmError::InvalidTransaction(xid));
        };

        let id = block_on(participant.identify())
            .map_err(|e| TmError::ParticipantUnreachable(e.to_string()))?;

        match txn.status() {
            TxnStatus::Aborted => self.replay_decision(txn, Decision::Abort, &id, &participant),
            TxnStatus::Committed => self.replay_decision(txn, Decision::Commit, &id, &participant),
            TxnStatus::New | TxnStatus::Prepared => self.register(txn, id, participant),
        }
    }

    /// Late enlistment after a decision: deliver it and retire one pending
    /// entry, preferring the one with the caller's identity.
    fn replay_decision(
        &self,
        mut txn: TxnGuard<'_>,
        decision: Decision,
        id: &ParticipantId,
        participant: &Arc<dyn ResourceManager>,
    ) -> Result<()> {
        let xid = txn.xid();
        if !notify_one(xid, decision, participant) {
            return Ok(());
        }

        if txn.participants().len() <= 1 {
            return txn.remove();
        }

        let position = txn
            .participants()
            .iter()
            .position(|enlisted| &enlisted.id == id)
            .unwrap_or(0);
        txn.mutate_participants(|participants| {
            participants.remove(position);
        })
    }

    fn register(
        &self,
        mut txn: TxnGuard<'_>,
        id: ParticipantId,
        participant: Arc<dyn ResourceManager>,
    ) -> Result<()> {
        let xid = txn.xid();
        match probe(xid, txn.participants(), &id) {
            Probe::AlreadyEnlisted => Ok(()),
            Probe::NotEnlisted => {
                debug!("Participant {} enlisted in {}", id, xid);
                txn.mutate_participants(|participants| {
                    participants.push(Enlistment::new(id, participant));
                })
            }
            Probe::DeadParticipant => {
                warn!(
                    "Transaction {} has an unreachable participant, aborting on enlistment of {}",
                    xid, id
                );
                txn.mutate_status(TxnStatus::Aborted)?;
                notify_one(xid, Decision::Abort, &participant);

                // The unreachable entry is not singled out; the first one is retired.
                if txn.participants().len() <= 1 {
                    return txn.remove();
                }
                txn.mutate_participants(|participants| {
                    participants.remove(0);
                })
            }
        }
    }
}

fn probe(xid: Xid, participants: &[Enlistment], id: &ParticipantId) -> Probe {
    let mut found = false;
    for enlisted in participants {
        match block_on(enlisted.handle.identify()) {
            Ok(reported) => found |= &reported == id,
            Err(e) => {
                warn!(
                    "Participant {} of {} failed identity probe: {}",
                    enlisted.id, xid, e
                );
                return Probe::DeadParticipant;
            }
        }
    }
    if found {
        Probe::AlreadyEnlisted
    } else {
        Probe::NotEnlisted
    }
}
