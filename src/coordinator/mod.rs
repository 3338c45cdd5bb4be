// Transaction coordination engine: registry, enlistment, 2PC, recovery.

pub mod config;
pub mod enlist;
pub mod fault;
pub mod recovery;
pub mod registry;
pub mod retry;
#[cfg(feature = "durable")]
pub mod rocks_store;
pub mod twopc;

use std::sync::Arc;

use crate::Xid;
use crate::coordinator::fault::{DieTime, FaultInjector, Terminator};
use crate::coordinator::registry::TransactionRegistry;
use crate::storage::LogStore;

/// The outcome delivered to participants in the second phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Abort,
}

/// Drives every protocol step for every transaction.
///
/// Each public operation runs under the lock of the transaction it touches,
/// so operations on one xid are serialized while distinct xids proceed in
/// parallel.
pub struct Coordinator {
    registry: TransactionRegistry,
    faults: FaultInjector,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn LogStore>,
        next_xid: Xid,
        die_time: DieTime,
        terminator: Arc<dyn Terminator>,
    ) -> Self {
        Self {
            registry: TransactionRegistry::new(store, next_xid),
            faults: FaultInjector::new(die_time, terminator),
        }
    }

    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// `start`: allocates a fresh transaction.
    pub fn start(&self) -> crate::Result<Xid> {
        self.registry.allocate()
    }
}
