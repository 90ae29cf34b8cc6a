//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a cs3lease session.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Seconds after the last refresh at which a lock lapses.
    #[serde(default = "default_locks_expiration_time")]
    pub locks_expiration_time: u64,

    // =========================================================================
    // Storage settings
    // =========================================================================
    /// Root directory of the mounted storage. Conflict copies whose directory
    /// has vanished land here.
    #[serde(default = "default_mount_dir")]
    pub mount_dir: String,

    /// Home directory of the user; the backend is asked when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<String>,

    /// Size of each downloaded chunk, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Storage id used when a resource is addressed by opaque id.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    // =========================================================================
    // Authentication settings
    // =========================================================================
    #[serde(default)]
    pub authenticator: AuthenticatorKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Login type passed along with client credentials.
    #[serde(default = "default_login_type")]
    pub login_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eos_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eos_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locks_expiration_time: default_locks_expiration_time(),
            mount_dir: default_mount_dir(),
            home_dir: None,
            chunk_size: default_chunk_size(),
            endpoint: default_endpoint(),
            authenticator: AuthenticatorKind::default(),
            client_id: None,
            client_secret: None,
            login_type: default_login_type(),
            oauth_token: None,
            oauth_file: None,
            eos_token: None,
            eos_file: None,
        }
    }
}
