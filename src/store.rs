//! Usage Log Store
//!
//! Append-only, date-partitioned storage for [`UsageRecord`]s behind the
//! [`UsageStore`] trait, so the calculation and aggregation code never sees
//! the backend.
//!
//! ## Backends
//!
//! - [`JsonlStore`] - one JSON Lines file per UTC date inside a directory
//! - [`MemoryStore`] - in-process partitions, for tests and embedding
//!
//! ## JSONL guarantees
//!
//! - **Durability**: every append is written and `fsync`ed (`sync_data`) before
//!   it returns
//! - **Atomic append**: the whole line goes out in one `O_APPEND` write, and
//!   writers in the same process are serialized per partition
//! - **Streaming reads**: partitions are decoded line by line, never loaded whole
//! - **Read failures**: a missing partition reads as empty; a corrupt line is
//!   logged and yielded as [`UsageError::CorruptRecord`] so the consumer can
//!   count it and carry on; an I/O failure mid-read ends the stream

use crate::error::{Result, UsageError};
use crate::models::UsageRecord;
use crate::partition::{PartitionKey, PartitionNaming};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Records of one partition, decoded lazily. Items are either a record or
/// the error for one entry; only [`UsageError::CorruptRecord`] items may be
/// followed by further records.
pub type RecordStream = BoxStream<'static, Result<UsageRecord>>;

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Durably append `record` to the partition of its timestamp's UTC date.
    async fn append(&self, record: &UsageRecord) -> Result<()>;

    /// Stream one partition. Each call starts a fresh pass.
    async fn read(&self, key: PartitionKey) -> Result<RecordStream>;

    /// Partitions that exist, oldest first.
    async fn partitions(&self) -> Result<Vec<PartitionKey>>;
}

pub struct JsonlStore {
    root: PathBuf,
    naming: PartitionNaming,
    locks: DashMap<PartitionKey, Arc<Mutex<()>>>,
}

impl JsonlStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_naming(root, PartitionNaming::default())
    }

    pub fn with_naming(root: impl Into<PathBuf>, naming: PartitionNaming) -> Self {
        Self {
            root: root.into(),
            naming,
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> &PartitionNaming {
        &self.naming
    }

    pub fn partition_path(&self, key: PartitionKey) -> PathBuf {
        self.root.join(self.naming.file_name(key))
    }

    fn partition_lock(&self, key: PartitionKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().value().clone()
    }
}

#[async_trait]
impl UsageStore for JsonlStore {
    async fn append(&self, record: &UsageRecord) -> Result<()> {
        let key = PartitionKey::for_timestamp(&record.timestamp);
        let path = self.partition_path(key);

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let lock = self.partition_lock(key);
        let root = self.root.clone();
        let target = path.clone();

        // The blocking task runs to completion even if this future is dropped,
        // so a cancelled caller's record can still land.
        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            append_line(&root, &target, &line)
        })
        .await
        .map_err(|e| UsageError::persistence(&path, std::io::Error::other(e)))??;

        debug!(partition = %key, path = %path.display(), "Appended usage record");
        Ok(())
    }

    async fn read(&self, key: PartitionKey) -> Result<RecordStream> {
        let path = self.partition_path(key);

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(partition = %key, "Partition does not exist yet");
                return Ok(stream::empty().boxed());
            }
            Err(e) => return Err(UsageError::persistence(path, e)),
        };

        Ok(decode_lines(BufReader::new(file), path).boxed())
    }

    async fn partitions(&self) -> Result<Vec<PartitionKey>> {
        let pattern = format!(
            "{}{}{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            MAIN_SEPARATOR,
            self.naming.glob_pattern()
        );
        let naming = self.naming.clone();

        tokio::task::spawn_blocking(move || list_partitions(&pattern, &naming))
            .await
            .map_err(|e| UsageError::persistence(&self.root, std::io::Error::other(e)))?
    }
}

fn append_line(root: &Path, path: &Path, line: &[u8]) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| UsageError::persistence(root, e))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| UsageError::persistence(path, e))?;

    file.write_all(line)
        .map_err(|e| UsageError::persistence(path, e))?;
    file.sync_data()
        .map_err(|e| UsageError::persistence(path, e))
}

fn list_partitions(pattern: &str, naming: &PartitionNaming) -> Result<Vec<PartitionKey>> {
    let paths = glob::glob(pattern)
        .map_err(|e| UsageError::validation(format!("invalid partition pattern {pattern}: {e}")))?;

    let mut keys: Vec<PartitionKey> = paths
        .flatten()
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| naming.parse_file_name(name))
        })
        .collect();

    keys.sort();
    keys.dedup();
    Ok(keys)
}

struct LineCursor<R> {
    reader: R,
    path: PathBuf,
    line_number: usize,
    buf: Vec<u8>,
    done: bool,
}

/// Decode a JSONL source one line at a time. Blank lines are ignored.
pub fn decode_lines<R>(
    reader: R,
    path: PathBuf,
) -> impl Stream<Item = Result<UsageRecord>> + Send
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let cursor = LineCursor {
        reader,
        path,
        line_number: 0,
        buf: Vec::new(),
        done: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        loop {
            if cursor.done {
                return None;
            }

            cursor.buf.clear();
            match cursor.reader.read_until(b'\n', &mut cursor.buf).await {
                Ok(0) => return None,
                Ok(_) => {
                    cursor.line_number += 1;
                    if cursor.buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }

                    let item = match serde_json::from_slice::<UsageRecord>(&cursor.buf) {
                        Ok(record) => Ok(record),
                        Err(e) => {
                            warn!(
                                path = %cursor.path.display(),
                                line = cursor.line_number,
                                error = %e,
                                "Skipping corrupt usage record"
                            );
                            Err(UsageError::CorruptRecord {
                                line: cursor.line_number,
                                reason: e.to_string(),
                            })
                        }
                    };
                    return Some((item, cursor));
                }
                Err(e) => {
                    cursor.done = true;
                    let err = UsageError::persistence(cursor.path.clone(), e);
                    return Some((Err(err), cursor));
                }
            }
        }
    })
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<BTreeMap<PartitionKey, Vec<UsageRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn append(&self, record: &UsageRecord) -> Result<()> {
        let key = PartitionKey::for_timestamp(&record.timestamp);
        self.partitions
            .write()
            .await
            .entry(key)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn read(&self, key: PartitionKey) -> Result<RecordStream> {
        let records = self
            .partitions
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default();
        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }

    async fn partitions(&self) -> Result<Vec<PartitionKey>> {
        Ok(self.partitions.read().await.keys().copied().collect())
    }
}
