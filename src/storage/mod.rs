//! Storage collaborators consumed by the lock protocol.
//!
//! The remote backend offers stat, arbitrary key/value metadata, container
//! operations, and transfer initiation. Bytes move through a separate
//! content transport using the descriptor returned by the backend. Neither
//! offers a conditional write, so lock metadata writes are last-write-wins.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: in-process, used by tests and multi-session simulations
//! - [`LocalStore`]: rooted in a local directory, used by the CLI

mod local;
mod memory;


pub use local::LocalStore;
pub use memory::{MemoryStore, Operation};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

/// Characters left untouched by [`quote`]: alphanumerics plus `_ . - ~ /`.
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Like [`QUOTE_SET`] but `/` is encoded too, for opaque ids.
const ID_QUOTE_SET: &AsciiSet = &QUOTE_SET.add(b'/');

/// Prefix of opaque ids handed out by the bundled stores.
pub const FILE_ID_PREFIX: &str = "fileid-";

/// URL-quote a string, keeping `/` readable.
pub fn quote(s: &str) -> String {
    utf8_percent_encode(s, QUOTE_SET).to_string()
}

/// Reverse of [`quote`]. Returns `None` for invalid UTF-8.
pub fn unquote(s: &str) -> Option<String> {
    percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|c| c.into_owned())
}

/// Build the opaque id for a path (`/einstein/a.txt` → `fileid-einstein%2Fa.txt`).
pub fn file_id_for_path(path: &str) -> String {
    format!(
        "{}{}",
        FILE_ID_PREFIX,
        utf8_percent_encode(path.trim_start_matches('/'), ID_QUOTE_SET)
    )
}

/// Recover the path from an opaque id produced by [`file_id_for_path`].
pub fn path_for_file_id(opaque_id: &str) -> Option<String> {
    let encoded = opaque_id.strip_prefix(FILE_ID_PREFIX)?;
    unquote(encoded).map(|p| format!("/{}", p))
}

/// Split `/dir/name.ext` into (`/dir`, `name.ext`). The parent of a
/// top-level entry is `/`.
pub fn split_path(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), trimmed[1..].to_string()),
        Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

/// Join a directory and a file name with exactly one separator.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Status codes reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    Internal,
    Unavailable,
}

/// A non-OK backend reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Result of a backend call.
pub type StatusResult<T> = std::result::Result<T, Status>;

/// How a resource is addressed.
///
/// Paths must start with `/`; anything else is an opaque id scoped to a
/// storage id (the endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Path(String),
    Id {
        storage_id: String,
        opaque_id: String,
    },
}

impl ResourceRef {
    /// Interpret `file_id` as a path when it starts with `/`, otherwise as an
    /// opaque id on `endpoint`.
    pub fn new(file_id: &str, endpoint: &str) -> Self {
        if file_id.starts_with('/') {
            ResourceRef::Path(file_id.to_string())
        } else {
            ResourceRef::Id {
                storage_id: endpoint.to_string(),
                opaque_id: file_id.to_string(),
            }
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        ResourceRef::Path(path.into())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Path(p) => write!(f, "{}", p),
            ResourceRef::Id {
                storage_id,
                opaque_id,
            } => write!(f, "{}:{}", storage_id, opaque_id),
        }
    }
}

/// Identifies a file or container, by path and by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub storage_id: String,
    pub opaque_id: String,
    pub path: String,
    pub endpoint: String,
}

impl ResourceHandle {
    /// Reference by id. Metadata writes use this form.
    pub fn id_ref(&self) -> ResourceRef {
        ResourceRef::Id {
            storage_id: self.storage_id.clone(),
            opaque_id: self.opaque_id.clone(),
        }
    }

    pub fn path_ref(&self) -> ResourceRef {
        ResourceRef::Path(self.path.clone())
    }
}

/// File or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Container,
}

/// Result of a stat call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub handle: ResourceHandle,
    pub kind: ResourceKind,
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    pub arbitrary_metadata: BTreeMap<String, String>,
}

impl ResourceInfo {
    pub fn path(&self) -> &str {
        &self.handle.path
    }

    pub fn is_container(&self) -> bool {
        self.kind == ResourceKind::Container
    }
}

/// Where and how to move bytes for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub protocol: String,
    pub endpoint: String,
    pub token: String,
}

/// The remote storage backend.
pub trait StorageBackend: Send + Sync {
    /// Stat a resource, including all arbitrary metadata.
    fn stat(&self, reference: &ResourceRef) -> StatusResult<ResourceInfo>;

    /// Set one arbitrary metadata entry. Unconditional, last write wins.
    fn set_metadata(&self, reference: &ResourceRef, key: &str, value: &str) -> StatusResult<()>;

    fn initiate_download(&self, reference: &ResourceRef) -> StatusResult<TransferDescriptor>;

    fn initiate_upload(&self, reference: &ResourceRef, size: u64)
    -> StatusResult<TransferDescriptor>;

    fn delete(&self, reference: &ResourceRef) -> StatusResult<()>;

    fn list_container(&self, reference: &ResourceRef) -> StatusResult<Vec<ResourceInfo>>;

    fn move_resource(&self, source: &ResourceRef, destination: &ResourceRef) -> StatusResult<()>;

    fn create_container(&self, reference: &ResourceRef) -> StatusResult<()>;

    /// The current user's home path.
    fn home(&self) -> StatusResult<String>;
}

/// Streams bytes to or from a transfer endpoint.
pub trait ContentTransport: Send + Sync {
    fn download(&self, descriptor: &TransferDescriptor) -> StatusResult<Box<dyn Read + Send>>;

    fn upload(&self, descriptor: &TransferDescriptor, content: &[u8]) -> StatusResult<()>;
}
