use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::Xid;

/// Identity reported by a Resource Manager.
///
/// Two handles that report the same `ParticipantId` are the same participant,
/// no matter how many distinct handles the transport hands out for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Error type for calls made against a Resource Manager.
///
/// The coordinator never propagates these to its own callers: during prepare
/// any error is a veto, during commit/abort notification it leaves the
/// participant in the residual pending set.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParticipantError {
    /// The participant could not be reached (crashed, partitioned, unbound).
    #[error("Participant unreachable: {0}")]
    Unreachable(String),
    /// A general-purpose error variant for other participant-specific issues.
    #[error("Other participant error: {0}")]
    Other(String),
}

pub type ParticipantResult<T> = std::result::Result<T, ParticipantError>;

/// A Resource Manager as seen from the coordinator.
///
/// Every call is a remote call from the coordinator's perspective and may fail
/// with a communication error. The futures are boxed so that handles can be
/// stored as `Arc<dyn ResourceManager>` and fanned out concurrently.
///
/// # Examples
///
/// ```no_run
/// use futures::future::{self, BoxFuture, FutureExt};
/// use tmcoord::prelude::*;
///
/// struct AlwaysYes(ParticipantId);
///
/// impl ResourceManager for AlwaysYes {
///     fn identify(&self) -> BoxFuture<'_, ParticipantResult<ParticipantId>> {
///         future::ready(Ok(self.0.clone())).boxed()
///     }
///
///     fn prepare(&self, _xid: Xid) -> BoxFuture<'_, ParticipantResult<bool>> {
///         future::ready(Ok(true)).boxed()
///     }
///
///     fn commit(&self, _xid: Xid) -> BoxFuture<'_, ParticipantResult<()>> {
///         future::ready(Ok(())).boxed()
///     }
///
///     fn abort(&self, _xid: Xid) -> BoxFuture<'_, ParticipantResult<()>> {
///         future::ready(Ok(())).boxed()
///     }
/// }
/// ```
pub trait ResourceManager: Send + Sync {
    /// Returns the stable identity of this Resource Manager.
    fn identify(&self) -> BoxFuture<'_, ParticipantResult<ParticipantId>>;

    /// Phase 1. `Ok(true)` votes to commit, `Ok(false)` vetoes.
    fn prepare(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<bool>>;

    /// Phase 2: apply the prepared work for `xid`.
    fn commit(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<()>>;

    /// Phase 2: discard all work done for `xid`.
    fn abort(&self, xid: Xid) -> BoxFuture<'_, ParticipantResult<()>>;
}

/// Name binding for Resource Managers.
///
/// Only identities are persisted, so after a restart the coordinator asks the
/// directory for a handle to each recorded identity. Resolving never fails:
/// a handle to a dead participant simply fails when it is called.
pub trait ParticipantDirectory: Send + Sync {
    fn resolve(&self, id: &ParticipantId) -> Arc<dyn ResourceManager>;
}

/// A participant handle together with the identity it reported at enlistment.
#[derive(Clone)]
pub struct Enlistment {
    pub id: ParticipantId,
    pub handle: Arc<dyn ResourceManager>,
}

impl Enlistment {
    pub fn new(id: ParticipantId, handle: Arc<dyn ResourceManager>) -> Self {
        Self { id, handle }
    }
}

impl fmt::Debug for Enlistment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enlistment").field("id", &self.id).finish()
    }
}
