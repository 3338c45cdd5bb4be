use std::sync::Arc;

use log::{debug, info};

use crate::coordinator::Coordinator;
use crate::coordinator::config::TmConfig;
use crate::coordinator::fault::{DieTime, Terminator};
use crate::coordinator::recovery::RecoveryReport;
use crate::coordinator::retry::NotificationRetrier;
use crate::errors::Result;
use crate::participant::{ParticipantDirectory, ParticipantId, ResourceManager};
use crate::storage::LogStore;
use crate::{TxnStatus, Xid};

/// tmcoord Prelude
pub mod prelude {
    pub use crate::coordinator::config::*;
    pub use crate::coordinator::fault::{DieTime, Terminator};
    pub use crate::coordinator::recovery::RecoveryReport;
    pub use crate::errors::*;
    pub use crate::participant::*;
    pub use crate::storage::*;
    pub use crate::tm::TransactionManager;
    pub use crate::{TxnStatus, Xid};
    #[cfg(feature = "durable")]
    pub use crate::coordinator::rocks_store::RocksLogStore;
}

/// The Transaction Manager: the operations a transport exposes to clients
/// and Resource Managers.
///
/// Construction replays the persisted logs, so by the time a
/// `TransactionManager` exists every transaction left behind by a previous
/// incarnation has been driven toward its terminal outcome.
pub struct TransactionManager {
    coordinator: Arc<Coordinator>,
    recovery: RecoveryReport,
    /// Joins its thread on drop.
    retrier: Option<NotificationRetrier>,
}

impl TransactionManager {
    /// Opens the RocksDB log store at `config.storage_path`, recovers, and
    /// arms the configured die point. Die points exit the process.
    #[cfg(feature = "durable")]
    pub fn open(config: &TmConfig, directory: &dyn ParticipantDirectory) -> Result<Self> {
        let store = crate::coordinator::rocks_store::RocksLogStore::open(&config.storage_path)?;
        Self::with_store(
            config,
            Arc::new(store),
            directory,
            Arc::new(crate::coordinator::fault::ProcessExit),
        )
    }

    /// Recovers from an arbitrary log store.
    ///
    /// # Arguments
    ///
    /// * `config` - Die point and retrier settings; `storage_path` is ignored.
    /// * `store` - The logical logs of this coordinator.
    /// * `directory` - Resolves persisted participant identities to handles.
    /// * `terminator` - What a die point does.
    pub fn with_store(
        config: &TmConfig,
        store: Arc<dyn LogStore>,
        directory: &dyn ParticipantDirectory,
        terminator: Arc<dyn Terminator>,
    ) -> Result<Self> {
        let (coordinator, recovery) =
            Coordinator::recover(store, directory, config.die_time, terminator)?;
        let coordinator = Arc::new(coordinator);

        let retrier = config
            .retry_interval()
            .map(|interval| NotificationRetrier::spawn(Arc::clone(&coordinator), interval));

        info!(
            "Transaction manager ready, next xid {}, die time {}",
            recovery.next_xid, config.die_time
        );

        Ok(Self {
            coordinator,
            recovery,
            retrier,
        })
    }

    /// Starts a new transaction and returns its id.
    pub fn start(&self) -> Result<Xid> {
        self.coordinator.start()
    }

    /// Records that `participant` is doing work on behalf of `xid`.
    pub fn enlist(&self, xid: Xid, participant: Arc<dyn ResourceManager>) -> Result<()> {
        self.coordinator.enlist(xid, participant)
    }

    /// Runs two-phase commit for `xid`.
    pub fn commit(&self, xid: Xid) -> Result<bool> {
        self.coordinator.commit(xid)
    }

    /// Aborts `xid`.
    pub fn abort(&self, xid: Xid) -> Result<()> {
        self.coordinator.abort(xid)
    }

    /// Liveness probe. A failure can only come from the transport.
    pub fn ping(&self) {
        debug!("ping");
    }

    /// Terminates immediately.
    pub fn die_now(&self) -> ! {
        self.coordinator.faults().die_now()
    }

    /// Arms a die point: `NoDie`, `BeforeCommit` or `AfterCommit`.
    pub fn set_die_time(&self, token: &str) {
        self.coordinator.faults().set_die_time(token);
    }

    pub fn die_time(&self) -> DieTime {
        self.coordinator.faults().die_time()
    }

    /// Status of `xid`, `None` if it is not tracked.
    pub fn status(&self, xid: Xid) -> Option<TxnStatus> {
        self.coordinator.registry().lookup_status(xid)
    }

    /// Participants still tracked for `xid`, in enlistment order.
    pub fn participants(&self, xid: Xid) -> Option<Vec<ParticipantId>> {
        self.coordinator.registry().lookup_participants(xid)
    }

    /// Xids currently tracked, in ascending order.
    pub fn tracked(&self) -> Vec<Xid> {
        self.coordinator.registry().tracked_xids()
    }

    /// One pass of re-delivering decisions to residual participants.
    pub fn redrive_pending(&self) -> Result<usize> {
        self.coordinator.redrive_pending()
    }

    /// What startup recovery did.
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn has_retrier(&self) -> bool {
        self.retrier.is_some()
    }
}
