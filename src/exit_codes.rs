//! Exit code constants for the cs3lease CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid configuration)
//! - 2: Resource not found
//! - 3: Transport failure talking to the storage backend
//! - 4: Lock conflict with another session
//! - 5: Authentication failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// The addressed file or container does not exist.
pub const NOT_FOUND: i32 = 2;

/// A backend call failed.
pub const TRANSPORT_FAILURE: i32 = 3;

/// Another session holds an unexpired lease.
pub const LOCK_FAILURE: i32 = 4;

/// The current actor could not be identified.
pub const AUTH_FAILURE: i32 = 5;
