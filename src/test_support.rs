//! Shared fixtures for unit tests.

use crate::clock::ManualClock;
use crate::config::Config;
use crate::context::SessionContext;
use crate::identity::{
    Authenticator, Credentials, Identity, IdentityResolver, IdentityService, TokenSource,
};
use crate::storage::{MemoryStore, Status, StatusResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 2024-01-02T03:04:05Z
pub(crate) const T0: f64 = 1_704_164_645.0;

pub(crate) fn einstein() -> Identity {
    Identity::new("einstein", "cernbox.cern.ch", "4c510ada-c86b-4815-8820-42cdf82c3d51")
}

pub(crate) fn marie() -> Identity {
    Identity::new("marie", "cesnet.cz", "f7fbf8c8-139b-4376-b307-cf0a8c2d0d9c")
}

/// Identity service that always answers with the same identity, or always fails.
pub(crate) struct StaticIdentityService {
    answer: StatusResult<Identity>,
    who_am_i_calls: AtomicUsize,
}

impl StaticIdentityService {
    pub(crate) fn new(identity: Identity) -> Self {
        Self {
            answer: Ok(identity),
            who_am_i_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(status: Status) -> Self {
        Self {
            answer: Err(status),
            who_am_i_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn who_am_i_calls(&self) -> usize {
        self.who_am_i_calls.load(Ordering::SeqCst)
    }
}

impl IdentityService for StaticIdentityService {
    fn authenticate(&self, _credentials: &Credentials) -> StatusResult<String> {
        self.answer.as_ref().map(|_| "token".to_string()).map_err(Clone::clone)
    }

    fn who_am_i(&self, _token: &str) -> StatusResult<Identity> {
        self.who_am_i_calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// One simulated session: its context plus handles on the shared fixtures.
pub(crate) struct TestSession {
    pub(crate) ctx: SessionContext,
    pub(crate) identity_service: Arc<StaticIdentityService>,
}

/// Build a session acting as `identity` over a shared store and clock.
pub(crate) fn memory_session(
    store: &Arc<MemoryStore>,
    clock: &Arc<ManualClock>,
    identity: Identity,
) -> TestSession {
    memory_session_with(Config::default(), store, clock, identity)
}

pub(crate) fn memory_session_with(
    config: Config,
    store: &Arc<MemoryStore>,
    clock: &Arc<ManualClock>,
    identity: Identity,
) -> TestSession {
    let identity_service = Arc::new(StaticIdentityService::new(identity));
    let resolver = IdentityResolver::new(
        identity_service.clone(),
        Authenticator::OAuth(TokenSource::Inline("token".to_string())),
    );
    let ctx = SessionContext::new(
        config,
        store.clone(),
        store.clone(),
        resolver,
        clock.clone(),
    );
    TestSession {
        ctx,
        identity_service,
    }
}

/// A fresh store and a clock frozen at [`T0`].
pub(crate) fn shared_fixtures() -> (Arc<MemoryStore>, Arc<ManualClock>) {
    (Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(T0)))
}
