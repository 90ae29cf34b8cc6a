//! Locking subsystem for cs3lease.
//!
//! This module implements a cooperative, lease-based advisory lock stored in
//! the arbitrary metadata of the locked resource itself.
//!
//! # Lock Metadata
//!
//! The lock lives under the metadata key `cs3apis4lab_lock` as URL-quoted
//! JSON:
//! - `username`, `idp`, `opaque_id`: the owning identity
//! - `created`: epoch seconds when the owner first took the lock
//! - `updated`: epoch seconds of the last refresh
//!
//! A value that does not decode counts as no lock.
//!
//! # Lease Semantics
//!
//! A lock lapses once `now - updated` exceeds `locks_expiration_time`. There
//! is no unlock: a lock retires by lapsing or by being overwritten. A lapsed
//! lock can be taken over by anyone and the previous owner is not told. The
//! backend has no compare-and-swap, so two sessions racing on a free
//! resource can both believe they won.
//!
//! # Conflict Copies
//!
//! A write that meets a live foreign lock is redirected to a sibling named
//! `{stem}-{user}.{timestamp}-conflict.{ext}`.

mod conflict;
mod manager;
mod record;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use conflict::{ConflictResolver, conflict_file_name};
pub use manager::LockManager;
pub use record::{LOCK_METADATA_KEY, LockRecord};
pub use types::{LockDecision, LockStatus};
