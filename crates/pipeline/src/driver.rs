use extract::{BoundedExtractor, FailureKind, prompt};
use ingest::CourseBlock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointEntry, CheckpointStore};
use crate::metrics::{RunMetrics, TimedOperation};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Blocks per checkpoint write.
    pub batch_size: usize,
    /// Wall-clock budget for a single model call.
    pub deadline_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            deadline_secs: 30,
        }
    }
}

impl BatchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Drives the bounded extractor over course blocks, one batch at a time,
/// persisting the full checkpoint after every batch.
pub struct BatchDriver {
    extractor: BoundedExtractor,
    store: CheckpointStore,
    retry: RetryPolicy,
    metrics: Arc<RunMetrics>,
    batch_size: usize,
    deadline: Duration,
}

impl BatchDriver {
    pub fn new(extractor: BoundedExtractor, store: CheckpointStore, config: &BatchConfig) -> Self {
        Self {
            extractor,
            store,
            retry: RetryPolicy::none(),
            metrics: RunMetrics::new(),
            batch_size: config.batch_size.max(1),
            deadline: config.deadline(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Process `blocks` on top of `checkpoint` and return the grown checkpoint.
    ///
    /// Every attempted block gets exactly one entry. Failures are recorded,
    /// never propagated; a failed checkpoint write is logged and the run
    /// continues with the in-memory state.
    pub async fn run(&self, blocks: &[&CourseBlock], mut checkpoint: Checkpoint) -> Checkpoint {
        let total = blocks.len();
        let batch_count = total.div_ceil(self.batch_size);

        for (batch_index, batch) in blocks.chunks(self.batch_size).enumerate() {
            info!(
                batch = batch_index + 1,
                batches = batch_count,
                size = batch.len(),
                "Starting batch"
            );

            for (offset, block) in batch.iter().enumerate() {
                let ordinal = batch_index * self.batch_size + offset + 1;
                let entry = self.process_block(block, ordinal, total).await;
                checkpoint.record(entry);
            }

            self.extractor.release_memory().await;

            let saved = match self.store.save(&checkpoint).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, batch = batch_index + 1, "Error saving checkpoint");
                    false
                }
            };
            self.metrics.record_batch(saved);
        }

        checkpoint
    }

    async fn process_block(&self, block: &CourseBlock, ordinal: usize, total: usize) -> CheckpointEntry {
        let Some((title, description)) = block.fragments() else {
            warn!(
                block = ordinal,
                block_id = %block.id,
                has_title = block.title.is_some(),
                has_description = block.description.is_some(),
                "Skipping course block with missing fragments"
            );
            self.metrics.record_block(Some(FailureKind::MalformedInput));
            return CheckpointEntry::malformed(block);
        };

        info!(block = ordinal, total, title = %block.label(), "Processing course");

        let course_prompt = prompt::build_course_prompt(title, description);
        let (extractor, metrics, deadline) = (&self.extractor, &self.metrics, self.deadline);
        let prompt_text = course_prompt.as_str();
        let extraction = self
            .retry
            .retry(&block.id, || async move {
                let timer = TimedOperation::start();
                let extraction = extractor.call_with_deadline(prompt_text, deadline).await;
                metrics.record_call(timer.elapsed());
                extraction
            })
            .await;
        self.metrics.record_block(extraction.failure);

        match extraction.failure {
            None => info!(block = ordinal, "Successfully processed course"),
            Some(kind) => warn!(block = ordinal, failure = %kind, "Failed to get valid JSON for course"),
        }

        CheckpointEntry::from_extraction(block, extraction)
    }
}
