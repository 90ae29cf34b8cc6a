//! cs3lease: cooperative lease locks for files on CS3 storage.
//!
//! Editing sessions record who has a file open in the file's own arbitrary
//! metadata. A session that finds a live lock held by someone else opens the
//! file read-only, and saves it to a timestamped conflict copy instead of
//! overwriting. Locks are leases: a holder refreshes its record on each read
//! and write, and a record older than `locks_expiration_time` can be taken
//! over silently.
//!
//! The storage service, the content transport, the identity service and the
//! clock are traits so the protocol runs unchanged against the in-memory
//! store, the local directory store, or a remote gateway.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod exit_codes;
pub mod files;
pub mod fs;
pub mod identity;
pub mod locks;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::SessionContext;
pub use error::{LeaseError, Result};
pub use files::FileCoordinator;
