//! Chunked upload session store
//!
//! A session collects the chunks of one file, keyed by the client-generated
//! upload id. Sessions live in memory only and are lost on restart.
//!
//! Chunk writes, the received counter and completion detection happen under
//! a single lock: a slot counts towards completion only the first time it is
//! filled, and exactly one request observes completion and takes the session
//! out of the store for reassembly.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default inactivity timeout before the sweep drops a session: 30 minutes
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Session store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Chunk index {index} out of range for {total} chunks")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("totalChunks must be at least 1")]
    EmptyUpload,

    #[error("Upload declares {got} chunks but the session expects {expected}")]
    TotalChunksMismatch { expected: u32, got: u32 },

    #[error("Upload {upload_id} belongs to another user")]
    OwnerMismatch { upload_id: String },

    #[error("Chunk {0} missing at reassembly")]
    MissingChunk(u32),
}

/// One chunk as received by the chunk endpoint
#[derive(Debug, Clone)]
pub struct ChunkWrite {
    pub upload_id: String,
    pub user_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Declared size of the whole file
    pub file_size: u64,
    pub data: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// A file whose chunks have all arrived, concatenated in index order
#[derive(Debug, Clone)]
pub struct AssembledUpload {
    pub upload_id: String,
    pub user_id: String,
    pub data: Bytes,
    pub declared_size: u64,
    pub total_chunks: u32,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// Result of accepting a chunk
#[derive(Debug)]
pub enum ChunkProgress {
    /// More chunks are expected
    Pending { received: u32, total: u32 },
    /// All chunks arrived; the session has been removed from the store
    Complete(AssembledUpload),
}

/// In-flight state of one chunked upload
#[derive(Debug)]
pub struct UploadSession {
    pub upload_id: String,
    pub user_id: String,
    pub total_chunks: u32,
    pub file_size: u64,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Chunks received so far, keyed by index
    ///
    /// Sparse: memory follows the chunks that arrived, not the declared count.
    slots: BTreeMap<u32, Bytes>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UploadSession {
    fn new(first: &ChunkWrite, now: DateTime<Utc>) -> Result<Self, SessionError> {
        if first.total_chunks == 0 {
            return Err(SessionError::EmptyUpload);
        }

        Ok(Self {
            upload_id: first.upload_id.clone(),
            user_id: first.user_id.clone(),
            total_chunks: first.total_chunks,
            file_size: first.file_size,
            file_name: first.file_name.clone(),
            content_type: first.content_type.clone(),
            slots: BTreeMap::new(),
            created_at: now,
            last_activity: now,
        })
    }

    /// Store a chunk; returns true if the slot was previously empty
    ///
    /// Re-delivery of an index overwrites the slot (last write wins) without
    /// advancing the received counter.
    fn write(&mut self, index: u32, data: Bytes, now: DateTime<Utc>) -> Result<bool, SessionError> {
        if index >= self.total_chunks {
            return Err(SessionError::InvalidChunkIndex {
                index,
                total: self.total_chunks,
            });
        }

        let newly_filled = self.slots.insert(index, data).is_none();
        self.last_activity = now;
        Ok(newly_filled)
    }

    pub fn received(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.total_chunks
    }

    /// Concatenate all slots in index order
    fn assemble(self) -> Result<AssembledUpload, SessionError> {
        let total_len: usize = self.slots.values().map(Bytes::len).sum();
        let mut buffer = BytesMut::with_capacity(total_len);

        for index in 0..self.total_chunks {
            let chunk = self
                .slots
                .get(&index)
                .ok_or(SessionError::MissingChunk(index))?;
            buffer.extend_from_slice(chunk);
        }

        if buffer.len() as u64 != self.file_size {
            warn!(
                upload_id = %self.upload_id,
                declared = self.file_size,
                assembled = buffer.len(),
                "Assembled size differs from declared file size"
            );
        }

        Ok(AssembledUpload {
            upload_id: self.upload_id,
            user_id: self.user_id,
            data: buffer.freeze(),
            declared_size: self.file_size,
            total_chunks: self.total_chunks,
            file_name: self.file_name,
            content_type: self.content_type,
        })
    }
}

/// Storage for in-flight upload sessions
///
/// Implementations must make `accept_chunk` atomic per upload id: the slot
/// write, the received counter and the completion check form one step.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a chunk, creating the session on first arrival
    async fn accept_chunk(&self, chunk: ChunkWrite) -> Result<ChunkProgress, SessionError>;

    /// Remove sessions whose last activity is older than `max_age` at `now`
    ///
    /// Returns the number of sessions removed.
    async fn sweep_expired(&self, max_age: Duration, now: DateTime<Utc>) -> usize;

    /// Drop a session explicitly; returns true if it existed
    async fn remove(&self, upload_id: &str) -> bool;

    /// Number of sessions currently held
    async fn active_sessions(&self) -> usize;

    /// Chunks received so far for a session, if it exists
    async fn received_count(&self, upload_id: &str) -> Option<u32>;
}

/// Session store backed by an in-process map
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, UploadSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn accept_chunk(&self, chunk: ChunkWrite) -> Result<ChunkProgress, SessionError> {
        let now = Utc::now();

        let completed = {
            let mut sessions = self.sessions.lock().await;

            let session = match sessions.entry(chunk.upload_id.clone()) {
                Entry::Occupied(entry) => {
                    let session = entry.into_mut();
                    if session.total_chunks != chunk.total_chunks {
                        return Err(SessionError::TotalChunksMismatch {
                            expected: session.total_chunks,
                            got: chunk.total_chunks,
                        });
                    }
                    if session.user_id != chunk.user_id {
                        return Err(SessionError::OwnerMismatch {
                            upload_id: chunk.upload_id.clone(),
                        });
                    }
                    session
                }
                Entry::Vacant(entry) => {
                    let session = UploadSession::new(&chunk, now)?;
                    if chunk.chunk_index >= session.total_chunks {
                        return Err(SessionError::InvalidChunkIndex {
                            index: chunk.chunk_index,
                            total: session.total_chunks,
                        });
                    }
                    info!(
                        upload_id = %chunk.upload_id,
                        user_id = %chunk.user_id,
                        total_chunks = chunk.total_chunks,
                        file_size = chunk.file_size,
                        "Created upload session"
                    );
                    entry.insert(session)
                }
            };

            let newly_filled = session.write(chunk.chunk_index, chunk.data, now)?;
            if !newly_filled {
                debug!(
                    upload_id = %chunk.upload_id,
                    chunk_index = chunk.chunk_index,
                    "Duplicate chunk overwrote existing slot"
                );
            }

            if !session.is_complete() {
                return Ok(ChunkProgress::Pending {
                    received: session.received(),
                    total: session.total_chunks,
                });
            }

            sessions
                .remove(&chunk.upload_id)
                .ok_or(SessionError::MissingChunk(chunk.chunk_index))?
        };

        // Concatenation runs outside the lock; the session is already gone
        let assembled = completed.assemble()?;
        info!(
            upload_id = %assembled.upload_id,
            bytes = assembled.data.len(),
            chunks = assembled.total_chunks,
            "Upload session complete, reassembled"
        );
        Ok(ChunkProgress::Complete(assembled))
    }

    async fn sweep_expired(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|upload_id, session| {
            let expired = studio_common::time::is_older_than(session.last_activity, now, max_age);
            if expired {
                info!(
                    upload_id = %upload_id,
                    received = session.received(),
                    total = session.total_chunks,
                    "Dropping idle upload session"
                );
            }
            !expired
        });

        before - sessions.len()
    }

    async fn remove(&self, upload_id: &str) -> bool {
        self.sessions.lock().await.remove(upload_id).is_some()
    }

    async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn received_count(&self, upload_id: &str) -> Option<u32> {
        self.sessions
            .lock()
            .await
            .get(upload_id)
            .map(UploadSession::received)
    }
}
