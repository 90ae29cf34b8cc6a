//! In-process storage backend and transport.
//!
//! Thread-safe via `RwLock`. Several sessions can share one store to simulate
//! independent editors working against the same remote storage. Individual
//! operations can be made to fail to exercise error paths.

use super::{
    ContentTransport, ResourceHandle, ResourceInfo, ResourceKind, ResourceRef, Status, StatusCode,
    StatusResult, StorageBackend, TransferDescriptor, file_id_for_path, join_path,
    path_for_file_id, split_path,
};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

const MEMORY_PROTOCOL: &str = "simple";
const MEMORY_SCHEME: &str = "mem://";

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Stat,
    SetMetadata,
    InitiateDownload,
    InitiateUpload,
    Download,
    Upload,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: ResourceKind,
    data: Vec<u8>,
    metadata: BTreeMap<String, String>,
    mtime: i64,
}

impl Entry {
    fn container(mtime: i64) -> Self {
        Self {
            kind: ResourceKind::Container,
            data: Vec::new(),
            metadata: BTreeMap::new(),
            mtime,
        }
    }
}

#[derive(Debug)]
struct State {
    entries: BTreeMap<String, Entry>,
    tick: i64,
}

impl State {
    fn next_mtime(&mut self) -> i64 {
        self.tick += 1;
        self.tick
    }
}

/// In-memory storage for tests and simulations.
#[derive(Debug)]
pub struct MemoryStore {
    storage_id: String,
    home: String,
    state: RwLock<State>,
    failures: Mutex<HashMap<Operation, Status>>,
    stat_calls: AtomicUsize,
    metadata_writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store holding only the root container `/`.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), Entry::container(0));
        Self {
            storage_id: "123e4567-e89b-12d3-a456-426655440000".to_string(),
            home: "/".to_string(),
            state: RwLock::new(State { entries, tick: 0 }),
            failures: Mutex::new(HashMap::new()),
            stat_calls: AtomicUsize::new(0),
            metadata_writes: AtomicUsize::new(0),
        }
    }

    /// Set the path reported as the user's home.
    pub fn with_home(mut self, home: &str) -> Self {
        self.home = home.to_string();
        self
    }

    /// Create a file directly, bypassing locks. Parent containers are created.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let mut state = self.write_state();
        create_parents(&mut state, path);
        let mtime = state.next_mtime();
        let metadata = state
            .entries
            .get(path)
            .map(|e| e.metadata.clone())
            .unwrap_or_default();
        state.entries.insert(
            path.to_string(),
            Entry {
                kind: ResourceKind::File,
                data: data.to_vec(),
                metadata,
                mtime,
            },
        );
    }

    /// Create a container directly. Parent containers are created.
    pub fn put_container(&self, path: &str) {
        let mut state = self.write_state();
        create_parents(&mut state, path);
        let mtime = state.next_mtime();
        state
            .entries
            .entry(path.to_string())
            .or_insert_with(|| Entry::container(mtime));
    }

    /// Write a raw metadata value, bypassing the lock codec.
    pub fn put_metadata(&self, path: &str, key: &str, value: &str) {
        let mut state = self.write_state();
        if let Some(entry) = state.entries.get_mut(path) {
            entry.metadata.insert(key.to_string(), value.to_string());
        }
    }

    /// Current content of a file, if it exists.
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.read_state().entries.get(path).map(|e| e.data.clone())
    }

    /// Current raw metadata value.
    pub fn metadata_value(&self, path: &str, key: &str) -> Option<String> {
        self.read_state()
            .entries
            .get(path)
            .and_then(|e| e.metadata.get(key).cloned())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.read_state().entries.contains_key(path)
    }

    /// Make every subsequent call of `op` fail with `status`.
    pub fn fail(&self, op: Operation, status: Status) {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(op, status);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Number of stat calls served so far.
    pub fn stat_calls(&self) -> usize {
        self.stat_calls.load(Ordering::SeqCst)
    }

    /// Number of metadata writes served so far.
    pub fn metadata_writes(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    fn check(&self, op: Operation) -> StatusResult<()> {
        match self
            .failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&op)
        {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self, reference: &ResourceRef) -> StatusResult<String> {
        match reference {
            ResourceRef::Path(p) => Ok(normalize(p)),
            ResourceRef::Id {
                storage_id,
                opaque_id,
            } => {
                if storage_id != &self.storage_id && storage_id != "/" {
                    return Err(Status::not_found(format!(
                        "unknown storage id {}",
                        storage_id
                    )));
                }
                path_for_file_id(opaque_id)
                    .ok_or_else(|| Status::not_found(format!("unknown id {}", opaque_id)))
            }
        }
    }

    fn info(&self, path: &str, entry: &Entry) -> ResourceInfo {
        ResourceInfo {
            handle: ResourceHandle {
                storage_id: self.storage_id.clone(),
                opaque_id: file_id_for_path(path),
                path: path.to_string(),
                endpoint: "/".to_string(),
            },
            kind: entry.kind,
            size: entry.data.len() as u64,
            mtime: entry.mtime,
            arbitrary_metadata: entry.metadata.clone(),
        }
    }

    fn descriptor(path: &str, token: &str) -> TransferDescriptor {
        TransferDescriptor {
            protocol: MEMORY_PROTOCOL.to_string(),
            endpoint: format!("{}{}", MEMORY_SCHEME, path),
            token: token.to_string(),
        }
    }

    fn descriptor_path(descriptor: &TransferDescriptor) -> StatusResult<&str> {
        descriptor
            .endpoint
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| {
                Status::internal(format!("not a memory endpoint: {}", descriptor.endpoint))
            })
    }
}

fn normalize(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

fn create_parents(state: &mut State, path: &str) {
    let (parent, _) = split_path(path);
    if parent == "/" || state.entries.contains_key(&parent) {
        return;
    }
    create_parents(state, &parent);
    let mtime = state.next_mtime();
    state.entries.insert(parent, Entry::container(mtime));
}

fn is_direct_child(dir: &str, path: &str) -> bool {
    if path == dir {
        return false;
    }
    let (parent, _) = split_path(path);
    parent == dir
}

impl StorageBackend for MemoryStore {
    fn stat(&self, reference: &ResourceRef) -> StatusResult<ResourceInfo> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::Stat)?;
        let path = self.resolve(reference)?;
        let state = self.read_state();
        state
            .entries
            .get(&path)
            .map(|e| self.info(&path, e))
            .ok_or_else(|| Status::not_found("path not found when statting"))
    }

    fn set_metadata(&self, reference: &ResourceRef, key: &str, value: &str) -> StatusResult<()> {
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        self.check(Operation::SetMetadata)?;
        let path = self.resolve(reference)?;
        let mut state = self.write_state();
        let entry = state
            .entries
            .get_mut(&path)
            .ok_or_else(|| Status::not_found(format!("cannot set metadata on {}", path)))?;
        entry.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn initiate_download(&self, reference: &ResourceRef) -> StatusResult<TransferDescriptor> {
        self.check(Operation::InitiateDownload)?;
        let path = self.resolve(reference)?;
        match self.read_state().entries.get(&path) {
            Some(entry) if entry.kind == ResourceKind::File => {
                Ok(Self::descriptor(&path, "download"))
            }
            Some(_) => Err(Status::new(
                StatusCode::PermissionDenied,
                format!("{} is a container", path),
            )),
            None => Err(Status::not_found("file not found")),
        }
    }

    fn initiate_upload(
        &self,
        reference: &ResourceRef,
        _size: u64,
    ) -> StatusResult<TransferDescriptor> {
        self.check(Operation::InitiateUpload)?;
        let path = self.resolve(reference)?;
        let (parent, _) = split_path(&path);
        let state = self.read_state();
        match state.entries.get(&parent) {
            Some(entry) if entry.kind == ResourceKind::Container => {}
            _ => return Err(Status::not_found(format!("parent {} not found", parent))),
        }
        if let Some(entry) = state.entries.get(&path)
            && entry.kind == ResourceKind::Container
        {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("{} is a container", path),
            ));
        }
        Ok(Self::descriptor(&path, "upload"))
    }

    fn delete(&self, reference: &ResourceRef) -> StatusResult<()> {
        let path = self.resolve(reference)?;
        let mut state = self.write_state();
        if path == "/" || !state.entries.contains_key(&path) {
            return Err(Status::not_found(format!("{} not found", path)));
        }
        let prefix = join_path(&path, "");
        state
            .entries
            .retain(|p, _| p != &path && !p.starts_with(&prefix));
        Ok(())
    }

    fn list_container(&self, reference: &ResourceRef) -> StatusResult<Vec<ResourceInfo>> {
        let path = self.resolve(reference)?;
        let state = self.read_state();
        match state.entries.get(&path) {
            Some(entry) if entry.kind == ResourceKind::Container => {}
            Some(_) => {
                return Err(Status::new(
                    StatusCode::PermissionDenied,
                    format!("{} is not a container", path),
                ));
            }
            None => return Err(Status::not_found(format!("{} not found", path))),
        }
        Ok(state
            .entries
            .iter()
            .filter(|(p, _)| is_direct_child(&path, p))
            .map(|(p, e)| self.info(p, e))
            .collect())
    }

    fn move_resource(&self, source: &ResourceRef, destination: &ResourceRef) -> StatusResult<()> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        let mut state = self.write_state();
        if !state.entries.contains_key(&src) {
            return Err(Status::not_found(format!("{} not found", src)));
        }
        if state.entries.contains_key(&dst) {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("{} already exists", dst),
            ));
        }
        let src_prefix = join_path(&src, "");
        let moved: Vec<String> = state
            .entries
            .keys()
            .filter(|p| *p == &src || p.starts_with(&src_prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = state.entries.remove(&old) {
                let new = format!("{}{}", dst, &old[src.len()..]);
                state.entries.insert(new, entry);
            }
        }
        Ok(())
    }

    fn create_container(&self, reference: &ResourceRef) -> StatusResult<()> {
        let path = self.resolve(reference)?;
        let (parent, _) = split_path(&path);
        let mut state = self.write_state();
        if state.entries.contains_key(&path) {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("{} already exists", path),
            ));
        }
        if !state.entries.contains_key(&parent) {
            return Err(Status::not_found(format!("parent {} not found", parent)));
        }
        let mtime = state.next_mtime();
        state.entries.insert(path, Entry::container(mtime));
        Ok(())
    }

    fn home(&self) -> StatusResult<String> {
        Ok(self.home.clone())
    }
}

impl ContentTransport for MemoryStore {
    fn download(&self, descriptor: &TransferDescriptor) -> StatusResult<Box<dyn Read + Send>> {
        self.check(Operation::Download)?;
        let path = Self::descriptor_path(descriptor)?;
        let data = self
            .read_state()
            .entries
            .get(path)
            .map(|e| e.data.clone())
            .ok_or_else(|| Status::not_found("file not found"))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn upload(&self, descriptor: &TransferDescriptor, content: &[u8]) -> StatusResult<()> {
        self.check(Operation::Upload)?;
        let path = Self::descriptor_path(descriptor)?.to_string();
        let mut state = self.write_state();
        let mtime = state.next_mtime();
        let metadata = state
            .entries
            .get(&path)
            .map(|e| e.metadata.clone())
            .unwrap_or_default();
        state.entries.insert(
            path,
            Entry {
                kind: ResourceKind::File,
                data: content.to_vec(),
                metadata,
                mtime,
            },
        );
        Ok(())
    }
}
