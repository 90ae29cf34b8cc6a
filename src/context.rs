//! Session context for cs3lease.
//!
//! Everything a session needs (configuration, storage collaborators, the
//! identity resolver, the clock) is bundled into one explicitly constructed
//! [`SessionContext`] and passed down. There are no process-wide singletons,
//! so several sessions with different identities can share one backend and
//! one clock inside a single process.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::identity::{Authenticator, IdentityResolver, LocalIdentityService};
use crate::locks::{ConflictResolver, LockManager};
use crate::storage::{ContentTransport, LocalStore, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// Collaborators and settings for one editing session.
pub struct SessionContext {
    /// Read-only configuration.
    pub config: Config,

    pub backend: Arc<dyn StorageBackend>,

    pub transport: Arc<dyn ContentTransport>,

    /// Resolves (and caches) who this session acts as.
    pub identity: IdentityResolver,

    pub clock: Arc<dyn Clock>,
}

impl SessionContext {
    pub fn new(
        config: Config,
        backend: Arc<dyn StorageBackend>,
        transport: Arc<dyn ContentTransport>,
        identity: IdentityResolver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            backend,
            transport,
            identity,
            clock,
        }
    }

    /// Build a session over a local directory, acting as the local user.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionContext)` - Session ready to use
    /// * `Err(LeaseError::ResourceNotFound)` - `root` is not a directory
    /// * `Err(LeaseError::ConfigError)` - The authenticator settings are incomplete
    pub fn open_local<P: AsRef<Path>>(root: P, config: Config) -> Result<Self> {
        let store = Arc::new(
            LocalStore::open(root.as_ref())
                .map_err(|s| LeaseError::from_status(&s, "failed to open storage root"))?,
        );
        let authenticator = Authenticator::from_config(&config)?;
        let identity = IdentityResolver::new(Arc::new(LocalIdentityService), authenticator);

        Ok(Self::new(
            config,
            store.clone(),
            store,
            identity,
            Arc::new(SystemClock),
        ))
    }

    /// Current time in epoch seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Lease length in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.config.locks_expiration_time
    }

    pub fn locks(&self) -> LockManager<'_> {
        LockManager::new(self)
    }

    pub fn conflicts(&self) -> ConflictResolver<'_> {
        ConflictResolver::new(self)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
