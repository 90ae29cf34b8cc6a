//! Lock inspection, decision, and acquisition against resource metadata.

use super::record::{LOCK_METADATA_KEY, LockRecord};
use super::types::{LockDecision, LockStatus};
use crate::clock::is_expired;
use crate::context::SessionContext;
use crate::error::{LeaseError, Result};
use crate::storage::{ResourceInfo, ResourceRef};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives the lease lifecycle for one session.
///
/// The backend offers only an unconditional metadata write, so nothing here
/// is atomic: two sessions that both observe [`LockDecision::NoLock`] at the
/// same moment will both acquire, and the last metadata write wins.
#[derive(Debug, Clone, Copy)]
pub struct LockManager<'a> {
    ctx: &'a SessionContext,
}

impl<'a> LockManager<'a> {
    pub fn new(ctx: &'a SessionContext) -> Self {
        Self { ctx }
    }

    /// Read the lock from already-fetched metadata.
    ///
    /// Unreadable lock values count as no lock.
    pub fn inspect(&self, info: &ResourceInfo) -> Option<LockRecord> {
        let record = LockRecord::from_metadata(&info.arbitrary_metadata);
        if record.is_none() && info.arbitrary_metadata.contains_key(LOCK_METADATA_KEY) {
            warn!(path = info.path(), "ignoring malformed lock metadata");
        }
        record
    }

    /// Stat the resource once and read its lock.
    pub fn inspect_ref(&self, reference: &ResourceRef) -> Result<Option<LockRecord>> {
        let info = self
            .ctx
            .backend
            .stat(reference)
            .map_err(|s| LeaseError::from_status(&s, &format!("failed to stat {}", reference)))?;
        Ok(self.inspect(&info))
    }

    /// Decide what the current identity may do with the resource.
    ///
    /// The caller's own lock is honoured even after it lapses. A lapsed
    /// foreign lock is reclaimable without telling its owner.
    pub fn decide(&self, info: &ResourceInfo) -> Result<LockDecision> {
        let Some(record) = self.inspect(info) else {
            return Ok(LockDecision::NoLock);
        };

        let me = self.ctx.identity.current_identity()?;
        if record.is_owned_by(&me) {
            return Ok(LockDecision::OwnedByCaller);
        }

        let now = self.ctx.now();
        if is_expired(&record, self.ctx.ttl_secs(), now) {
            info!(
                path = info.path(),
                owner = %record.identity(),
                age_secs = record.age(now),
                "foreign lock expired, reclaimable"
            );
            return Ok(LockDecision::NoLock);
        }

        debug!(
            path = info.path(),
            owner = %record.identity(),
            "resource locked by another session"
        );
        Ok(LockDecision::HeldByOther(record))
    }

    /// Write a fresh lock for the current identity.
    ///
    /// Refreshing our own lock keeps its `created_at`; taking over or
    /// creating a lock starts a new one. Exactly one metadata write, addressed
    /// by id.
    pub fn acquire_or_refresh(&self, info: &ResourceInfo) -> Result<LockRecord> {
        let me = self.ctx.identity.current_identity()?;
        let now = self.ctx.now();

        let created_at = match self.inspect(info) {
            Some(existing) if existing.is_owned_by(&me) => existing.created_at.min(now),
            _ => now,
        };
        let record = LockRecord::new(&me, created_at, now);

        let started = Instant::now();
        self.ctx
            .backend
            .set_metadata(&info.handle.id_ref(), LOCK_METADATA_KEY, &record.encode())
            .map_err(|s| {
                LeaseError::TransportFailure(format!(
                    "failed to write lock on {}: {}",
                    info.path(),
                    s.message
                ))
            })?;

        debug!(
            path = info.path(),
            owner = %me,
            refreshed = created_at != now,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "lock written"
        );
        Ok(record)
    }

    /// Acquire or refresh the lock unless another session holds it.
    ///
    /// # Returns
    ///
    /// * `Ok(LockRecord)` - The lock now held by the current identity
    /// * `Err(LeaseError::LockConflict)` - A foreign, unexpired lock exists (exit code 4)
    /// * `Err(LeaseError::TransportFailure)` - The metadata write failed
    pub fn try_acquire(&self, info: &ResourceInfo) -> Result<LockRecord> {
        match self.decide(info)? {
            LockDecision::HeldByOther(record) => Err(LeaseError::LockConflict(format!(
                "{} is locked by {}@{} (refreshed {} ago)",
                info.path(),
                record.owner_username,
                record.owner_idp,
                record.age_string(self.ctx.now())
            ))),
            LockDecision::NoLock | LockDecision::OwnedByCaller => self.acquire_or_refresh(info),
        }
    }

    /// Describe the lock on a resource.
    pub fn status(&self, info: &ResourceInfo) -> Result<LockStatus> {
        let record = self.inspect(info);
        let decision = self.decide(info)?;
        let now = self.ctx.now();
        let ttl = self.ctx.ttl_secs();

        let (age_secs, remaining_secs, expired) = match &record {
            Some(r) => {
                let age = r.age(now);
                (
                    Some(age),
                    Some((ttl as f64 - age).max(0.0)),
                    is_expired(r, ttl, now),
                )
            }
            None => (None, None, false),
        };

        Ok(LockStatus {
            path: info.path().to_string(),
            record,
            decision,
            age_secs,
            remaining_secs,
            expired,
        })
    }
}
