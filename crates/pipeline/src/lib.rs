//! Resumable, checkpointed batch extraction over course blocks.
//!
//! [`ResumeController`] loads the last checkpoint and hands the unprocessed
//! blocks to [`BatchDriver`], which runs each one through the bounded model
//! call and persists the full checkpoint after every batch.

pub mod checkpoint;
pub mod driver;
pub mod metrics;
pub mod resume;
pub mod retry;

pub use checkpoint::{
    Checkpoint, CheckpointEntry, CheckpointError, CheckpointStore, ExtractionResult, LoadedCheckpoint,
};
pub use driver::{BatchConfig, BatchDriver};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use resume::ResumeController;
pub use retry::{RetryConfig, RetryPolicy};
