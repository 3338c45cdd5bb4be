use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::fault::DieTime;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TmConfig {
    /// Directory holding the coordinator's logical logs.
    pub storage_path: PathBuf,
    /// Die point armed at startup.
    #[serde(default)]
    pub die_time: DieTime,
    /// Period of the background re-drive of residual participants; `None`
    /// leaves residual sets to participant enlistments and restarts.
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
}

impl TmConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        self.retry_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl Default for TmConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("data"),
            die_time: DieTime::NoDie,
            retry_interval_ms: None,
        }
    }
}
