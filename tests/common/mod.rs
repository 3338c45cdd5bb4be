//! Common utilities for tmcoord integration tests.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap as HashMap;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

use tmcoord::prelude::*;

// --- MemoryLogStore ---

/// A `LogStore` that keeps the logical logs in memory.
///
/// Sharing one instance between two `TransactionManager`s stands in for a
/// process restart on the same disk.
#[derive(Default)]
pub struct MemoryLogStore {
    snapshot: Mutex<LogSnapshot>,
    writes: Mutex<usize>,
    failing_removals: Mutex<BTreeSet<Xid>>,
}

impl MemoryLogStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> LogSnapshot {
        self.snapshot.lock().clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }

    /// Makes `remove_transaction(xid)` fail until `heal` is called.
    pub fn fail_removal_of(&self, xid: Xid) {
        self.failing_removals.lock().insert(xid);
    }

    pub fn heal(&self) {
        self.failing_removals.lock().clear();
    }

    /// Seeds the logs as if a previous coordinator had written them.
    pub fn seed(&self, xid: Xid, status: TxnStatus, participants: &[&str]) {
        let mut snapshot = self.snapshot.lock();
        snapshot.statuses.insert(xid, status);
        snapshot
            .enlistments
            .insert(xid, participants.iter().map(|id| ParticipantId::new(*id)).collect());
        let next = snapshot.next_xid.unwrap_or(1).max(xid + 1);
        snapshot.next_xid = Some(next);
    }
}

impl LogStore for MemoryLogStore {
    fn write_counter(&self, next_xid: Xid) -> Result<()> {
        *self.writes.lock() += 1;
        self.snapshot.lock().next_xid = Some(next_xid);
        Ok(())
    }

    fn write_status(&self, xid: Xid, status: TxnStatus) -> Result<()> {
        *self.writes.lock() += 1;
        self.snapshot.lock().statuses.insert(xid, status);
        Ok(())
    }

    fn write_enlistments(&self, xid: Xid, participants: &[ParticipantId]) -> Result<()> {
        *self.writes.lock() += 1;
        self.snapshot
            .lock()
            .enlistments
            .insert(xid, participants.to_vec());
        Ok(())
    }

    fn remove_transaction(&self, xid: Xid) -> Result<()> {
        if self.failing_removals.lock().contains(&xid) {
            return Err(TmError::Storage(format!("remove of {} failed", xid)));
        }
        *self.writes.lock() += 1;
        let mut snapshot = self.snapshot.lock();
        snapshot.enlistments.remove(&xid);
        snapshot.statuses.remove(&xid);
        Ok(())
    }

    fn load(&self) -> Result<LogSnapshot> {
        Ok(self.snapshot.lock().clone())
    }
}

// --- MockParticipant ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Prepare(Xid),
    Commit(Xid),
    Abort(Xid),
}

/// A scripted Resource Manager that records every call it acknowledges.
pub struct MockParticipant {
    id: ParticipantId,
    vote: AtomicBool,
    alive: AtomicBool,
    drop_notifications: AtomicBool,
    events: Mutex<Vec<Event>>,
}

impl MockParticipant {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: ParticipantId::new(id),
            vote: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            drop_notifications: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn voting_no(id: &str) -> Arc<Self> {
        let participant = Self::new(id);
        participant.set_vote(false);
        participant
    }

    pub fn id(&self) -> ParticipantId {
        self.id.clone()
    }

    pub fn set_vote(&self, vote: bool) {
        self.vote.store(vote, Ordering::SeqCst);
    }

    /// A dead participant fails every call, including `identify`.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Rejects `commit`/`abort` while still answering `identify` and
    /// `prepare`.
    pub fn set_drop_notifications(&self, drop: bool) {
        self.drop_notifications.store(drop, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn commits(&self) -> Vec<Xid> {
        self.filter(|event| match event {
            Event::Commit(xid) => Some(xid),
            _ => None,
        })
    }

    pub fn aborts(&self) -> Vec<Xid> {
        self.filter(|event| match event {
            Event::Abort(xid) => Some(xid),
            _ => None,
        })
    }

    pub fn prepares(&self) -> Vec<Xid> {
        self.filter(|event| match event {
            Event::Prepare(xid) => Some(xid),
            _ => None,
        })
    }

    pub fn handle(self: &Arc<Self>) -> Arc<dyn ResourceManager> {
        Arc::clone(self) as Arc<dyn ResourceManager>
    }

    fn filter(&self, f: impl Fn(Event) -> Option<Xid>) -> Vec<Xid> {
        self.events.lock().iter().copied().filter_map(f).collect()
    }

    fn reachable(&self) -> ParticipantResult<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ParticipantError::Unreachable(self.id.to_string()))
        }
    }

    fn notification(&self, event: Event) -> ParticipantResult<()> {
        self.reachable()?;
        if self.drop_notifications.load(Ordering::SeqCst) {
            return Err(ParticipantError::Other(format!("{} rejected {:?}", self.id, event)));
        }
        self.events.lock().push(event);
        Ok(())
    }
}

impl ResourceManager for MockParticipant {
    fn identify(&self) -> BoxFuture<'_, ParticipantResult<ParticipantId>> {
        future::ready(self.reachable().map(|_| self.id.clone())).boxed()
    }

    fn prepare(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<bool>> {
        let result = self.reachable().map(|_| {
            self.events.lock().push(Event::Prepare(xid));
            self.vote.load(Ordering::SeqCst)
        });
        future::ready(result).boxed()
    }

    fn commit(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<()>> {
        future::ready(self.notification(Event::Commit(xid))).boxed()
    }

    fn abort(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<()>> {
        future::ready(self.notification(Event::Abort(xid))).boxed()
    }
}

// --- MockDirectory ---

/// Name binding for tests: identities resolve to registered mocks, anything
/// else to a handle that is never reachable.
#[derive(Default)]
pub struct MockDirectory {
    bound: Mutex<HashMap<ParticipantId, Arc<MockParticipant>>>,
}

impl MockDirectory {
    pub fn with(participants: &[&Arc<MockParticipant>]) -> Self {
        let directory = Self::default();
        for participant in participants {
            directory.bind(participant);
        }
        directory
    }

    pub fn bind(&self, participant: &Arc<MockParticipant>) {
        self.bound
            .lock()
            .insert(participant.id(), Arc::clone(participant));
    }
}

impl ParticipantDirectory for MockDirectory {
    fn resolve(&self, id: &ParticipantId) -> Arc<dyn ResourceManager> {
        match self.bound.lock().get(id) {
            Some(participant) => participant.handle(),
            None => {
                let unbound = MockParticipant::new(id.as_str());
                unbound.set_alive(false);
                unbound.handle()
            }
        }
    }
}

// --- Crash simulation ---

/// Terminator that unwinds instead of exiting, so a test can "restart" the
/// coordinator from the same log store.
pub struct PanicTerminator;

impl Terminator for PanicTerminator {
    fn terminate(&self) -> ! {
        panic!("coordinator terminated")
    }
}

/// Runs `f` and reports whether the coordinator died while running it.
pub fn dies(f: impl FnOnce()) -> bool {
    panic::catch_unwind(AssertUnwindSafe(f)).is_err()
}

// --- Helper Functions ---

/// Builds a coordinator over `store` with no die point and no retrier.
pub fn setup_tm(store: Arc<MemoryLogStore>, directory: &MockDirectory) -> TransactionManager {
    setup_tm_with(store, directory, TmConfig::default())
}

pub fn setup_tm_with(
    store: Arc<MemoryLogStore>,
    directory: &MockDirectory,
    config: TmConfig,
) -> TransactionManager {
    TransactionManager::with_store(&config, store, directory, Arc::new(PanicTerminator)).unwrap()
}

/// A fresh coordinator over an empty in-memory log.
pub fn fresh_tm() -> (TransactionManager, Arc<MemoryLogStore>) {
    let store = MemoryLogStore::new();
    let tm = setup_tm(Arc::clone(&store), &MockDirectory::default());
    (tm, store)
}
