//! Configuration model for cs3lease.
//!
//! The config is read from an optional YAML file and then overridden by
//! `CS3_<FIELD>` environment variables. Unknown fields are ignored, missing
//! fields take their defaults, and the result is validated before use. The
//! core only ever reads it.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::AuthenticatorKind;
