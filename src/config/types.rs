//! Configuration types and defaults for cs3lease.

use serde::{Deserialize, Serialize};

/// Which authentication scheme a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorKind {
    /// Client id and secret, exchanged by the gateway for a token (default).
    #[default]
    RevaPassword,
    /// A pre-issued OAuth token, inline or from a file.
    Oauth,
    /// An EOS token, inline or from a file.
    Eos,
}

impl AuthenticatorKind {
    /// Parse an authenticator kind from a string.
    ///
    /// Also accepts the class names used by the notebook extension's config.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reva_password" | "cs3api4lab.auth.RevaPassword" => Some(Self::RevaPassword),
            "oauth" | "cs3api4lab.auth.Oauth" => Some(Self::Oauth),
            "eos" | "cs3api4lab.auth.Eos" => Some(Self::Eos),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RevaPassword => "reva_password",
            Self::Oauth => "oauth",
            Self::Eos => "eos",
        }
    }
}

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "CS3_";

// Default value functions for serde
pub(crate) fn default_locks_expiration_time() -> u64 {
    150
}
pub(crate) fn default_mount_dir() -> String {
    "/".to_string()
}
pub(crate) fn default_chunk_size() -> usize {
    4_194_304
}
pub(crate) fn default_endpoint() -> String {
    "/".to_string()
}
pub(crate) fn default_login_type() -> String {
    "basic".to_string()
}
