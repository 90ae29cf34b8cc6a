//! Conflict-copy naming for writes that collide with a foreign lock.

use crate::context::SessionContext;
use crate::error::{LeaseError, Result};
use crate::storage::{ResourceRef, StatusCode, join_path, split_path};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Timestamp layout embedded in conflict names.
const CONFLICT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Build the name of a conflict copy.
///
/// The name splits at the last `.`: `report.ipynb` written by `alice` becomes
/// `report-alice.2024-01-02_03_04_05-conflict.ipynb`. A name without a dot
/// keeps no extension and gets no trailing dot.
pub fn conflict_file_name(file_name: &str, username: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format(CONFLICT_TIMESTAMP_FORMAT);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}-conflict.{}", stem, username, stamp, ext),
        None => format!("{}-{}.{}-conflict", file_name, username, stamp),
    }
}

/// Picks where a colliding write lands instead of the locked resource.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver<'a> {
    ctx: &'a SessionContext,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(ctx: &'a SessionContext) -> Self {
        Self { ctx }
    }

    /// Compute the conflict-copy path for `path`.
    ///
    /// The copy goes next to the original. When the original's directory is
    /// gone it goes to the configured mount directory instead. The result
    /// never equals `path`.
    pub fn resolve(&self, path: &str, username: &str, at: DateTime<Utc>) -> Result<String> {
        let (dir, file_name) = split_path(path);
        let target_dir = self.existing_dir_or_mount(&dir)?;
        let resolved = join_path(&target_dir, &conflict_file_name(&file_name, username, at));

        info!(path, conflict_path = %resolved, "redirecting write to conflict copy");
        Ok(resolved)
    }

    fn existing_dir_or_mount(&self, dir: &str) -> Result<String> {
        match self.ctx.backend.stat(&ResourceRef::path(dir)) {
            Ok(_) => Ok(dir.to_string()),
            Err(status) if status.code == StatusCode::NotFound => {
                warn!(
                    dir,
                    mount_dir = %self.ctx.config.mount_dir,
                    "parent directory vanished, using mount directory"
                );
                Ok(self.ctx.config.mount_dir.clone())
            }
            Err(status) => Err(LeaseError::from_status(
                &status,
                &format!("failed to stat directory {}", dir),
            )),
        }
    }
}
