//! Storage rooted in a local directory.
//!
//! Resource paths map onto files under the root. Arbitrary metadata lives in
//! JSON sidecars under `<root>/.cs3lease/meta/`, which mirrors the resource
//! tree: the sidecar of `/d/a.txt` is `meta/d/a.txt/.cs3lease`. A resource's
//! sidecar and those of everything below it share one directory, so deletes
//! and moves carry whole subtrees. Resource names may not be `.cs3lease`,
//! which keeps sidecar names from colliding with entries. Sidecars are
//! written atomically and never show up in listings.

use super::{
    ContentTransport, ResourceHandle, ResourceInfo, ResourceKind, ResourceRef, Status, StatusCode,
    StatusResult, StorageBackend, TransferDescriptor, file_id_for_path, join_path,
    path_for_file_id,
};
use crate::fs::atomic_write;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Name of the hidden state directory under the root.
pub const STATE_DIR: &str = ".cs3lease";

const LOCAL_STORAGE_ID: &str = "local";
const LOCAL_PROTOCOL: &str = "simple";

/// Directory-backed storage used by the CLI.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`. The directory must exist.
    pub fn open<P: AsRef<Path>>(root: P) -> StatusResult<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Status::not_found(format!(
                "storage root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join("meta")
    }

    /// Directory holding the sidecars of `path` and its descendants.
    fn meta_tree(&self, path: &str) -> PathBuf {
        self.meta_dir().join(path.trim_start_matches('/'))
    }

    fn sidecar(&self, path: &str) -> PathBuf {
        self.meta_tree(path).join(STATE_DIR)
    }

    fn resolve(&self, reference: &ResourceRef) -> StatusResult<String> {
        let path = match reference {
            ResourceRef::Path(p) => p.clone(),
            ResourceRef::Id {
                storage_id,
                opaque_id,
            } => {
                if storage_id != LOCAL_STORAGE_ID && storage_id != "/" {
                    return Err(Status::not_found(format!(
                        "unknown storage id {}",
                        storage_id
                    )));
                }
                path_for_file_id(opaque_id)
                    .ok_or_else(|| Status::not_found(format!("unknown id {}", opaque_id)))?
            }
        };
        if path.len() > 1 {
            Ok(path.trim_end_matches('/').to_string())
        } else {
            Ok(path)
        }
    }

    /// Map a resource path to a filesystem path, refusing escapes from the root.
    fn fs_path(&self, path: &str) -> StatusResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(name) if name != STATE_DIR => {}
                Component::CurDir => {}
                _ => {
                    return Err(Status::new(
                        StatusCode::PermissionDenied,
                        format!("path '{}' is outside the storage root", path),
                    ));
                }
            }
        }
        Ok(self.root.join(relative))
    }

    fn read_metadata(&self, path: &str) -> BTreeMap<String, String> {
        fs::read_to_string(self.sidecar(path))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn write_metadata(&self, path: &str, metadata: &BTreeMap<String, String>) -> StatusResult<()> {
        let json = serde_json::to_string_pretty(metadata)
            .map_err(|e| Status::internal(format!("failed to serialize metadata: {}", e)))?;
        atomic_write(self.sidecar(path), json.as_bytes())
            .map_err(|e| Status::internal(e.to_string()))
    }

    /// Carry the sidecars of `src` and everything below it over to `dst`.
    /// Sidecars left at `dst` by resources removed outside the store are dropped.
    fn move_meta_tree(&self, src: &str, dst: &str) -> std::io::Result<()> {
        let from = self.meta_tree(src);
        let to = self.meta_tree(dst);
        if to.exists() {
            fs::remove_dir_all(&to)?;
        }
        if !from.exists() {
            return Ok(());
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from, &to)
    }

    fn info(&self, path: &str, fs_path: &Path) -> StatusResult<ResourceInfo> {
        let meta = fs::metadata(fs_path).map_err(|e| io_status(e, path))?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(ResourceInfo {
            handle: ResourceHandle {
                storage_id: LOCAL_STORAGE_ID.to_string(),
                opaque_id: file_id_for_path(path),
                path: path.to_string(),
                endpoint: "/".to_string(),
            },
            kind: if meta.is_dir() {
                ResourceKind::Container
            } else {
                ResourceKind::File
            },
            size: if meta.is_dir() { 0 } else { meta.len() },
            mtime,
            arbitrary_metadata: self.read_metadata(path),
        })
    }

    fn descriptor(fs_path: &Path, token: &str) -> TransferDescriptor {
        TransferDescriptor {
            protocol: LOCAL_PROTOCOL.to_string(),
            endpoint: fs_path.to_string_lossy().to_string(),
            token: token.to_string(),
        }
    }

    /// Transfer endpoints must point inside the root.
    fn descriptor_path(&self, descriptor: &TransferDescriptor) -> StatusResult<PathBuf> {
        let path = PathBuf::from(&descriptor.endpoint);
        if !path.starts_with(&self.root) {
            return Err(Status::new(
                StatusCode::PermissionDenied,
                format!("endpoint '{}' is outside the storage root", descriptor.endpoint),
            ));
        }
        Ok(path)
    }
}

fn io_status(err: std::io::Error, path: &str) -> Status {
    match err.kind() {
        ErrorKind::NotFound => Status::not_found(format!("path not found when statting: {}", path)),
        ErrorKind::PermissionDenied => {
            Status::new(StatusCode::PermissionDenied, format!("{}: {}", path, err))
        }
        ErrorKind::AlreadyExists => {
            Status::new(StatusCode::AlreadyExists, format!("{}: {}", path, err))
        }
        _ => Status::internal(format!("{}: {}", path, err)),
    }
}

impl StorageBackend for LocalStore {
    fn stat(&self, reference: &ResourceRef) -> StatusResult<ResourceInfo> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        self.info(&path, &fs_path)
    }

    fn set_metadata(&self, reference: &ResourceRef, key: &str, value: &str) -> StatusResult<()> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        if !fs_path.exists() {
            return Err(Status::not_found(format!("cannot set metadata on {}", path)));
        }
        let mut metadata = self.read_metadata(&path);
        metadata.insert(key.to_string(), value.to_string());
        self.write_metadata(&path, &metadata)
    }

    fn initiate_download(&self, reference: &ResourceRef) -> StatusResult<TransferDescriptor> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        if !fs_path.is_file() {
            return Err(Status::not_found(format!("file not found: {}", path)));
        }
        Ok(Self::descriptor(&fs_path, "download"))
    }

    fn initiate_upload(
        &self,
        reference: &ResourceRef,
        _size: u64,
    ) -> StatusResult<TransferDescriptor> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        match fs_path.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Err(Status::not_found(format!("parent of {} not found", path))),
        }
        if fs_path.is_dir() {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("{} is a container", path),
            ));
        }
        Ok(Self::descriptor(&fs_path, "upload"))
    }

    fn delete(&self, reference: &ResourceRef) -> StatusResult<()> {
        let path = self.resolve(reference)?;
        if path == "/" {
            return Err(Status::new(
                StatusCode::PermissionDenied,
                "refusing to delete the storage root",
            ));
        }
        let fs_path = self.fs_path(&path)?;
        let result = if fs_path.is_dir() {
            fs::remove_dir_all(&fs_path)
        } else {
            fs::remove_file(&fs_path)
        };
        result.map_err(|e| io_status(e, &path))?;

        let tree = self.meta_tree(&path);
        if tree.exists() {
            fs::remove_dir_all(&tree).map_err(|e| Status::internal(e.to_string()))?;
        }
        Ok(())
    }

    fn list_container(&self, reference: &ResourceRef) -> StatusResult<Vec<ResourceInfo>> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        let entries = fs::read_dir(&fs_path).map_err(|e| io_status(e, &path))?;

        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_status(e, &path))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == STATE_DIR {
                continue;
            }
            let child = join_path(&path, &name);
            infos.push(self.info(&child, &entry.path())?);
        }
        infos.sort_by(|a, b| a.handle.path.cmp(&b.handle.path));
        Ok(infos)
    }

    fn move_resource(&self, source: &ResourceRef, destination: &ResourceRef) -> StatusResult<()> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        let src_fs = self.fs_path(&src)?;
        let dst_fs = self.fs_path(&dst)?;
        if !src_fs.exists() {
            return Err(Status::not_found(format!("{} not found", src)));
        }
        if dst_fs.exists() {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("{} already exists", dst),
            ));
        }
        fs::rename(&src_fs, &dst_fs).map_err(|e| io_status(e, &src))?;
        self.move_meta_tree(&src, &dst).map_err(|e| {
            Status::internal(format!("failed to move metadata of {}: {}", src, e))
        })
    }

    fn create_container(&self, reference: &ResourceRef) -> StatusResult<()> {
        let path = self.resolve(reference)?;
        let fs_path = self.fs_path(&path)?;
        fs::create_dir(&fs_path).map_err(|e| io_status(e, &path))
    }

    fn home(&self) -> StatusResult<String> {
        Ok("/".to_string())
    }
}

impl ContentTransport for LocalStore {
    fn download(&self, descriptor: &TransferDescriptor) -> StatusResult<Box<dyn Read + Send>> {
        let path = self.descriptor_path(descriptor)?;
        let file = File::open(&path).map_err(|e| io_status(e, &descriptor.endpoint))?;
        Ok(Box::new(file))
    }

    fn upload(&self, descriptor: &TransferDescriptor, content: &[u8]) -> StatusResult<()> {
        let path = self.descriptor_path(descriptor)?;
        atomic_write(&path, content).map_err(|e| Status::internal(e.to_string()))
    }
}
