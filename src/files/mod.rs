//! File operations with the lease protocol applied.
//!
//! [`FileCoordinator`] is the entry point an editor session talks to. Reads
//! take or refresh the session's lock when they can and fall back to
//! read-only when another session holds it. Writes follow one policy:
//! a write that meets a live foreign lock is redirected to a conflict copy
//! next to the original ([`FileCoordinator::write`]). The overwrite
//! primitive [`FileCoordinator::write_with_lock`] stays available for
//! callers that have already decided to take the file.

mod reader;


pub use reader::{ChunkReader, ReadOnlyReason, ReadSession};

use crate::clock::to_datetime;
use crate::context::SessionContext;
use crate::error::{LeaseError, Result};
use crate::locks::{LockDecision, LockRecord};
use crate::storage::{ResourceInfo, ResourceRef, Status, StatusCode};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Where a write landed.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Path actually written.
    pub path: String,

    /// True when the write went to a conflict copy instead of the requested path.
    pub redirected: bool,

    /// True when the file did not exist before.
    pub created: bool,

    /// The lock held on `path` after the write.
    pub lock: LockRecord,
}

/// Lock-aware file operations for one session.
#[derive(Debug)]
pub struct FileCoordinator {
    ctx: SessionContext,
}

impl FileCoordinator {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn reference(&self, path: &str) -> ResourceRef {
        ResourceRef::new(path, &self.ctx.config.endpoint)
    }

    fn status_error(status: Status, action: &str, path: &str) -> LeaseError {
        LeaseError::from_status(&status, &format!("failed to {} {}", action, path))
    }

    /// Stat a resource by path or id, then re-stat it by id.
    ///
    /// A stat by path can briefly disagree with the resource's id view right
    /// after a write. The second stat, by the id the first one returned, is
    /// always made so callers work with the canonical handle.
    #[instrument(skip(self), level = "debug")]
    pub fn stat(&self, path: &str) -> Result<ResourceInfo> {
        let started = Instant::now();
        let first = self
            .ctx
            .backend
            .stat(&self.reference(path))
            .map_err(|s| Self::status_error(s, "stat", path))?;
        let info = self
            .ctx
            .backend
            .stat(&first.handle.id_ref())
            .map_err(|s| Self::status_error(s, "stat", path))?;

        debug!(
            path = info.path(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stat"
        );
        Ok(info)
    }

    /// Open a file for reading.
    ///
    /// The session takes or refreshes its lock first. If another session
    /// holds an unexpired lock, or writing the lock fails, the file still
    /// opens but read-only.
    #[instrument(skip(self))]
    pub fn read(&self, path: &str) -> Result<ReadSession> {
        let info = self.stat(path)?;
        if info.is_container() {
            return Err(LeaseError::UserError(format!("{} is a directory", path)));
        }

        let locks = self.ctx.locks();
        let (lock, read_only_reason) = match locks.decide(&info)? {
            LockDecision::HeldByOther(record) => {
                warn!(
                    path = info.path(),
                    owner = %record.identity(),
                    "file is locked, opening in read-only mode"
                );
                (None, Some(ReadOnlyReason::HeldByOther(record.identity())))
            }
            LockDecision::NoLock | LockDecision::OwnedByCaller => {
                match locks.acquire_or_refresh(&info) {
                    Ok(record) => (Some(record), None),
                    Err(e @ LeaseError::AuthenticationFailure(_)) => return Err(e),
                    Err(e) => {
                        warn!(
                            path = info.path(),
                            error = %e,
                            "failed to lock file, opening in read-only mode"
                        );
                        (None, Some(ReadOnlyReason::LockWriteFailed(e.to_string())))
                    }
                }
            }
        };

        let started = Instant::now();
        let descriptor = self
            .ctx
            .backend
            .initiate_download(&info.handle.id_ref())
            .map_err(|s| Self::status_error(s, "initiate download of", path))?;
        let source = self
            .ctx
            .transport
            .download(&descriptor)
            .map_err(|s| Self::status_error(s, "download", path))?;
        info!(
            path = info.path(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            read_only = lock.is_none(),
            "download started"
        );

        let chunks = ChunkReader::new(source, self.ctx.config.chunk_size, info.path());
        Ok(ReadSession {
            read_only: lock.is_none(),
            read_only_reason,
            lock,
            info,
            chunks,
        })
    }

    /// Write `content` to `path`, taking the lock regardless of who holds it.
    ///
    /// An existing file is locked first and then overwritten. A new file is
    /// uploaded first and locked once it exists.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub fn write_with_lock(&self, path: &str, content: &[u8]) -> Result<WriteOutcome> {
        let locks = self.ctx.locks();

        let existing = match self.stat(path) {
            Ok(info) => Some(info),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match existing {
            Some(info) => {
                if info.is_container() {
                    return Err(LeaseError::UserError(format!("{} is a directory", path)));
                }
                if let LockDecision::HeldByOther(record) = locks.decide(&info)? {
                    warn!(
                        path = info.path(),
                        owner = %record.identity(),
                        "overwriting file locked by another session"
                    );
                }
                let lock = locks.acquire_or_refresh(&info)?;
                self.upload(&info.handle.path_ref(), info.path(), content)?;
                Ok(WriteOutcome {
                    path: info.path().to_string(),
                    redirected: false,
                    created: false,
                    lock,
                })
            }
            None => {
                info!(path, "creating new file");
                self.upload(&self.reference(path), path, content)?;
                let info = self.stat(path)?;
                let lock = locks.acquire_or_refresh(&info)?;
                Ok(WriteOutcome {
                    path: info.path().to_string(),
                    redirected: false,
                    created: true,
                    lock,
                })
            }
        }
    }

    fn upload(&self, reference: &ResourceRef, path: &str, content: &[u8]) -> Result<()> {
        let started = Instant::now();
        let descriptor = self
            .ctx
            .backend
            .initiate_upload(reference, content.len() as u64)
            .map_err(|s| Self::status_error(s, "initiate upload of", path))?;
        self.ctx
            .transport
            .upload(&descriptor, content)
            .map_err(|s| Self::status_error(s, "upload", path))?;

        info!(
            path,
            bytes = content.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "file uploaded"
        );
        Ok(())
    }

    /// Pick the path a write to `path` should go to.
    ///
    /// Returns a conflict-copy path when another session holds an unexpired
    /// lock on `path`, and `path` itself otherwise (including when it does
    /// not exist yet).
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_writable_path(&self, path: &str) -> Result<String> {
        let info = match self.stat(path) {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(path.to_string()),
            Err(e) => return Err(e),
        };

        match self.ctx.locks().decide(&info)? {
            LockDecision::HeldByOther(_) => {
                let me = self.ctx.identity.current_identity()?;
                self.ctx
                    .conflicts()
                    .resolve(info.path(), &me.username, to_datetime(self.ctx.now()))
            }
            LockDecision::NoLock | LockDecision::OwnedByCaller => Ok(path.to_string()),
        }
    }

    /// Save `content`, never overwriting a file another session holds.
    ///
    /// A live foreign lock redirects the write to a conflict copy; the
    /// original stays untouched.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub fn write(&self, path: &str, content: &[u8]) -> Result<WriteOutcome> {
        let target = self.resolve_writable_path(path)?;
        let redirected = target != path;

        let mut outcome = self.write_with_lock(&target, content)?;
        outcome.redirected = redirected;
        if redirected {
            warn!(
                path,
                conflict_path = %outcome.path,
                "file is locked by another session, saved a conflict copy"
            );
        }
        Ok(outcome)
    }

    /// Delete a file or directory.
    #[instrument(skip(self))]
    pub fn remove(&self, path: &str) -> Result<()> {
        let started = Instant::now();
        self.ctx
            .backend
            .delete(&self.reference(path))
            .map_err(|s| Self::status_error(s, "remove", path))?;
        debug!(
            path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "removed"
        );
        Ok(())
    }

    /// List a directory.
    ///
    /// When `mount_dir` is not `/`, entry paths are reported relative to it.
    #[instrument(skip(self), level = "debug")]
    pub fn list_directory(&self, path: &str) -> Result<Vec<ResourceInfo>> {
        let mut entries = self
            .ctx
            .backend
            .list_container(&self.reference(path))
            .map_err(|s| Self::status_error(s, "list directory", path))?;

        let mount_dir = self.ctx.config.mount_dir.trim_end_matches('/');
        if !mount_dir.is_empty() {
            for entry in &mut entries {
                if let Some(rest) = entry.handle.path.strip_prefix(mount_dir)
                    && (rest.is_empty() || rest.starts_with('/'))
                {
                    entry.handle.path = if rest.is_empty() {
                        "/".to_string()
                    } else {
                        rest.to_string()
                    };
                }
            }
        }
        Ok(entries)
    }

    /// Move a file or directory. The destination must not exist.
    #[instrument(skip(self))]
    pub fn move_resource(&self, source: &str, destination: &str) -> Result<()> {
        match self.ctx.backend.stat(&self.reference(destination)) {
            Ok(_) => {
                return Err(LeaseError::UserError(format!(
                    "cannot move {} to {}: file already exists",
                    source, destination
                )));
            }
            Err(status) if status.code == StatusCode::NotFound => {}
            Err(status) => return Err(Self::status_error(status, "stat", destination)),
        }

        self.ctx
            .backend
            .move_resource(&self.reference(source), &self.reference(destination))
            .map_err(|s| Self::status_error(s, "move", source))?;
        info!(source, destination, "moved");
        Ok(())
    }

    /// Create a directory. Its parent must exist.
    #[instrument(skip(self))]
    pub fn create_directory(&self, path: &str) -> Result<()> {
        self.ctx
            .backend
            .create_container(&self.reference(path))
            .map_err(|s| Self::status_error(s, "create directory", path))?;
        debug!(path, "directory created");
        Ok(())
    }

    /// The user's home directory: configured, or as reported by the backend.
    pub fn home_dir(&self) -> Result<String> {
        if let Some(home) = self.ctx.config.home_dir.as_deref()
            && !home.is_empty()
        {
            return Ok(home.to_string());
        }
        self.ctx
            .backend
            .home()
            .map_err(|s| LeaseError::from_status(&s, "failed to get home directory"))
    }
}
