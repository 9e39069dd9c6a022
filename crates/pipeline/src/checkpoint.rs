use extract::{Extraction, FailureKind, StructuredCourse};
use ingest::CourseBlock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {path:?} is corrupt")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write checkpoint {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize checkpoint")]
    Serialize(#[from] serde_json::Error),
}

/// Record of one attempted block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub block_id: String,
    pub position: usize,
    #[serde(default)]
    pub course: Option<StructuredCourse>,
    #[serde(default)]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl CheckpointEntry {
    pub fn from_extraction(block: &CourseBlock, extraction: Extraction) -> Self {
        Self {
            block_id: block.id.clone(),
            position: block.position,
            course: extraction.course,
            raw_response: extraction.raw_response,
            failure: extraction.failure,
        }
    }

    /// Tombstone for a block whose input was unusable.
    pub fn malformed(block: &CourseBlock) -> Self {
        Self::from_extraction(block, Extraction::failed(FailureKind::MalformedInput, None))
    }

    pub fn is_success(&self) -> bool {
        self.course.is_some()
    }
}

/// A successful extraction: the course and the model text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult<'a> {
    pub course: &'a StructuredCourse,
    pub raw_response: Option<&'a str>,
}

/// Everything attempted so far, ordered by block position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    entries: Vec<CheckpointEntry>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(mut entries: Vec<CheckpointEntry>) -> Self {
        entries.sort_by_key(|e| e.position);
        Self { entries }
    }

    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry, replacing any earlier entry for the same block.
    pub fn record(&mut self, entry: CheckpointEntry) {
        self.entries.retain(|e| e.block_id != entry.block_id);
        let at = self.entries.partition_point(|e| e.position <= entry.position);
        self.entries.insert(at, entry);
    }

    /// Block ids that should not be attempted again.
    ///
    /// With `retry_transient`, blocks that failed on a timeout or model error
    /// are left out so they get another attempt.
    pub fn settled_ids(&self, retry_transient: bool) -> HashSet<&str> {
        self.entries
            .iter()
            .filter(|e| !(retry_transient && e.failure.is_some_and(FailureKind::is_transient)))
            .map(|e| e.block_id.as_str())
            .collect()
    }

    /// Successful extractions in block order.
    pub fn results(&self) -> impl Iterator<Item = ExtractionResult<'_>> {
        self.entries.iter().filter_map(|e| {
            e.course.as_ref().map(|course| ExtractionResult {
                course,
                raw_response: e.raw_response.as_deref(),
            })
        })
    }

    /// Every preserved raw response, failed ones included.
    pub fn raw_responses(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| e.raw_response.as_deref())
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    /// Keep only entries for blocks still in `blocks`, moved to their
    /// current positions. Returns the entries that matched no block.
    pub fn retain_blocks(&mut self, blocks: &[CourseBlock]) -> Vec<CheckpointEntry> {
        let positions: HashMap<&str, usize> =
            blocks.iter().map(|b| (b.id.as_str(), b.position)).collect();

        let (mut current, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| positions.contains_key(e.block_id.as_str()));
        for entry in &mut current {
            entry.position = positions[entry.block_id.as_str()];
        }

        *self = Self::from_entries(current);
        stale
    }
}

/// On-disk checkpoint layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCheckpoint {
    Tracked(Vec<CheckpointEntry>),
    /// Bare `[course, raw]` pairs, successes only, with no block identity.
    Legacy(Vec<(StructuredCourse, Option<String>)>),
}

/// What was found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedCheckpoint {
    Tracked(Checkpoint),
    Legacy(Vec<(StructuredCourse, Option<String>)>),
}

/// Reads and atomically overwrites the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// `Ok(None)` when no checkpoint exists yet.
    pub async fn load(&self) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No checkpoint found");
                return Ok(None);
            }
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let stored: StoredCheckpoint =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(Some(match stored {
            StoredCheckpoint::Tracked(entries) => {
                LoadedCheckpoint::Tracked(Checkpoint::from_entries(entries))
            }
            StoredCheckpoint::Legacy(pairs) => LoadedCheckpoint::Legacy(pairs),
        }))
    }

    /// Replace the checkpoint file with `checkpoint`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the target
    /// so a crash never leaves a truncated checkpoint behind.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec(&checkpoint.entries)?;
        let temp_path = self.temp_path();
        let write_err = |source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = fs::File::create(&temp_path).await.map_err(write_err)?;
        file.write_all(&json).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(write_err)?;

        info!(
            path = ?self.path,
            entries = checkpoint.len(),
            succeeded = checkpoint.success_count(),
            "Saved checkpoint"
        );
        Ok(())
    }
}
