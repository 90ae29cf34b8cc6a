//! Lock decision and status structures.

use super::record::LockRecord;
use std::fmt;

/// What a session may do with a resource, given its lock metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum LockDecision {
    /// No live lock: none recorded, unreadable, or expired.
    NoLock,
    /// The caller holds the lock, whether or not it has lapsed.
    OwnedByCaller,
    /// Another identity holds an unexpired lock.
    HeldByOther(LockRecord),
}

impl LockDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockDecision::NoLock => "unlocked",
            LockDecision::OwnedByCaller => "owned",
            LockDecision::HeldByOther(_) => "held",
        }
    }

    pub fn is_held_by_other(&self) -> bool {
        matches!(self, LockDecision::HeldByOther(_))
    }
}

/// Snapshot of a resource's lock, for display.
#[derive(Debug, Clone)]
pub struct LockStatus {
    pub path: String,

    /// The decoded record, if any.
    pub record: Option<LockRecord>,

    pub decision: LockDecision,

    /// Seconds since the last refresh.
    pub age_secs: Option<f64>,

    /// Seconds until the lease lapses; zero once expired.
    pub remaining_secs: Option<f64>,

    pub expired: bool,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.record {
            None => write!(f, "{}: not locked", self.path),
            Some(record) => write!(
                f,
                "{}: {} (owner: {}@{}, refreshed {:.0}s ago, {}{})",
                self.path,
                self.decision.as_str(),
                record.owner_username,
                record.owner_idp,
                self.age_secs.unwrap_or_default(),
                match self.remaining_secs {
                    Some(secs) if !self.expired => format!("expires in {:.0}s", secs),
                    _ => "lapsed".to_string(),
                },
                if self.expired { ", EXPIRED" } else { "" }
            ),
        }
    }
}
