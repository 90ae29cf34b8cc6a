//! Lock record structure and its metadata encoding.

use crate::identity::Identity;
use crate::storage::{quote, unquote};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key under which the lock record is stored on a resource.
pub const LOCK_METADATA_KEY: &str = "cs3apis4lab_lock";

/// Lock record stored in resource metadata.
///
/// The JSON field names are shared with the notebook extension that
/// introduced the protocol, so sessions of either can read each other's
/// locks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(rename = "username")]
    pub owner_username: String,

    #[serde(rename = "idp")]
    pub owner_idp: String,

    #[serde(rename = "opaque_id")]
    pub owner_opaque_id: String,

    /// When the current owner first took the lock (epoch seconds).
    #[serde(rename = "created")]
    pub created_at: f64,

    /// Last acquire or refresh (epoch seconds). Expiry counts from here.
    #[serde(rename = "updated")]
    pub updated_at: f64,
}

impl LockRecord {
    pub fn new(owner: &Identity, created_at: f64, updated_at: f64) -> Self {
        Self {
            owner_username: owner.username.clone(),
            owner_idp: owner.idp.clone(),
            owner_opaque_id: owner.opaque_id.clone(),
            created_at,
            updated_at,
        }
    }

    /// Encode as percent-encoded JSON, ready to store as a metadata value.
    pub fn encode(&self) -> String {
        // Serializing a plain struct of strings and finite floats cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        quote(&json)
    }

    /// Decode a metadata value.
    ///
    /// Anything that is not a well-formed record yields `None`: empty
    /// values, broken escapes, invalid JSON, missing fields, and records
    /// whose `created` lies after `updated`.
    pub fn decode(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        let json = unquote(value)?;
        let record: LockRecord = serde_json::from_str(&json).ok()?;
        if !record.created_at.is_finite()
            || !record.updated_at.is_finite()
            || record.created_at > record.updated_at
        {
            return None;
        }
        Some(record)
    }

    /// Read the lock out of a resource's arbitrary metadata.
    pub fn from_metadata(metadata: &BTreeMap<String, String>) -> Option<Self> {
        metadata
            .get(LOCK_METADATA_KEY)
            .and_then(|value| Self::decode(value))
    }

    pub fn identity(&self) -> Identity {
        Identity::new(
            self.owner_username.clone(),
            self.owner_idp.clone(),
            self.owner_opaque_id.clone(),
        )
    }

    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.owner_username == identity.username
            && self.owner_idp == identity.idp
            && self.owner_opaque_id == identity.opaque_id
    }

    /// Seconds since the last refresh.
    pub fn age(&self, now: f64) -> f64 {
        (now - self.updated_at).max(0.0)
    }

    /// Format the time since the last refresh as a human-readable string.
    pub fn age_string(&self, now: f64) -> String {
        let secs = self.age(now) as u64;
        let minutes = secs / 60;
        let hours = minutes / 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, secs % 60)
        } else {
            format!("{}s", secs)
        }
    }
}
