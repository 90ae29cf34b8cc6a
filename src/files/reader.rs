//! Lazy chunked download stream.

use crate::error::{LeaseError, Result};
use crate::identity::Identity;
use crate::locks::LockRecord;
use crate::storage::ResourceInfo;
use std::fmt;
use std::io::{ErrorKind, Read};
use tracing::debug;

/// Yields a download as fixed-size chunks.
///
/// Each chunk is exactly `chunk_size` bytes except possibly the last.
/// Bytes are pulled from the transport only as the iterator advances. The
/// stream is single pass: after the end or the first error it yields
/// nothing more. Dropping it abandons the transfer.
pub struct ChunkReader {
    source: Option<Box<dyn Read + Send>>,
    chunk_size: usize,
    path: String,
    delivered: u64,
}

impl ChunkReader {
    pub fn new(source: Box<dyn Read + Send>, chunk_size: usize, path: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            chunk_size: chunk_size.max(1),
            path: path.into(),
            delivered: 0,
        }
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn fill(source: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source.as_mut()?;
        let mut buf = vec![0u8; self.chunk_size];

        match Self::fill(source.as_mut(), &mut buf) {
            Ok(0) => {
                debug!(path = %self.path, bytes = self.delivered, "download finished");
                self.source = None;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                self.delivered += n as u64;
                if n < self.chunk_size {
                    // Short read means end of stream
                    self.source = None;
                }
                Some(Ok(buf))
            }
            Err(e) => {
                self.source = None;
                Some(Err(LeaseError::TransportFailure(format!(
                    "download of {} failed after {} bytes: {}",
                    self.path, self.delivered, e
                ))))
            }
        }
    }
}

impl fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.path)
            .field("chunk_size", &self.chunk_size)
            .field("delivered", &self.delivered)
            .field("finished", &self.source.is_none())
            .finish()
    }
}

/// Why a file was opened read-only.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOnlyReason {
    /// Another session holds an unexpired lock.
    HeldByOther(Identity),
    /// Writing this session's lock failed.
    LockWriteFailed(String),
}

impl fmt::Display for ReadOnlyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadOnlyReason::HeldByOther(owner) => write!(f, "locked by {}", owner),
            ReadOnlyReason::LockWriteFailed(err) => write!(f, "could not be locked: {}", err),
        }
    }
}

/// An opened file: its metadata, lock outcome, and content stream.
#[derive(Debug)]
pub struct ReadSession {
    /// Canonical stat of the file as opened.
    pub info: ResourceInfo,

    /// True when this session could not take the lock and must not save.
    pub read_only: bool,

    /// Set whenever `read_only` is.
    pub read_only_reason: Option<ReadOnlyReason>,

    /// The lock written for this session, if any.
    pub lock: Option<LockRecord>,

    pub chunks: ChunkReader,
}

impl ReadSession {
    /// Drain the remaining chunks into one buffer.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.info.size as usize);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}
