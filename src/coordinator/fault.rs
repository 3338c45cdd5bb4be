use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Protocol instant at which the coordinator deliberately kills itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DieTime {
    /// No injected fault.
    #[default]
    NoDie,
    /// After `PREPARED` is durable, before `COMMITTED` is written.
    BeforeCommit,
    /// Right after `COMMITTED` is durable, before any participant is notified.
    AfterCommit,
}

impl DieTime {
    pub fn as_str(&self) -> &'static str {
        match self {
            DieTime::NoDie => "NoDie",
            DieTime::BeforeCommit => "BeforeCommit",
            DieTime::AfterCommit => "AfterCommit",
        }
    }
}

impl fmt::Display for DieTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DieTime {
    type Err = String;

    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        match token {
            "NoDie" => Ok(DieTime::NoDie),
            "BeforeCommit" => Ok(DieTime::BeforeCommit),
            "AfterCommit" => Ok(DieTime::AfterCommit),
            other => Err(format!("Unknown die time: {}", other)),
        }
    }
}

/// How the process goes away when a die point fires.
pub trait Terminator: Send + Sync {
    fn terminate(&self) -> !;
}

/// Exits the process immediately, without unwinding or cleanup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self) -> ! {
        std::process::exit(1)
    }
}

/// The coordinator's single die-point configuration cell.
pub struct FaultInjector {
    die_time: RwLock<DieTime>,
    terminator: Arc<dyn Terminator>,
}

impl FaultInjector {
    pub fn new(die_time: DieTime, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            die_time: RwLock::new(die_time),
            terminator,
        }
    }

    pub fn die_time(&self) -> DieTime {
        *self.die_time.read()
    }

    pub fn set(&self, die_time: DieTime) {
        *self.die_time.write() = die_time;
    }

    /// Accepts the wire tokens `NoDie`, `BeforeCommit` and `AfterCommit`.
    /// Anything else disables fault injection.
    pub fn set_die_time(&self, token: &str) {
        let die_time = token.parse().unwrap_or_else(|e| {
            warn!("{}; fault injection disabled", e);
            DieTime::NoDie
        });
        self.set(die_time);
    }

    /// Terminates if `point` is the configured die time.
    pub fn checkpoint(&self, point: DieTime) {
        if point != DieTime::NoDie && self.die_time() == point {
            info!("Die point {} reached, terminating", point);
            self.terminator.terminate();
        }
    }

    pub fn die_now(&self) -> ! {
        info!("Terminating on request");
        self.terminator.terminate()
    }
}
