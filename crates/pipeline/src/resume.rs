use extract::{Extraction, StructuredCourse};
use ingest::CourseBlock;
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointEntry, LoadedCheckpoint};
use crate::driver::BatchDriver;

/// Picks up where the last run stopped.
pub struct ResumeController {
    driver: BatchDriver,
    retry_failed: bool,
}

impl ResumeController {
    pub fn new(driver: BatchDriver) -> Self {
        Self {
            driver,
            retry_failed: false,
        }
    }

    /// Re-attempt blocks that previously timed out or hit a model error.
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    pub fn driver(&self) -> &BatchDriver {
        &self.driver
    }

    /// Load the checkpoint, falling back to an empty one if it is missing or
    /// unreadable. Entries for blocks no longer in `blocks` are dropped.
    pub async fn load_checkpoint(&self, blocks: &[CourseBlock]) -> Checkpoint {
        match self.driver.store().load().await {
            Ok(Some(LoadedCheckpoint::Tracked(mut checkpoint))) => {
                let stale = checkpoint.retain_blocks(blocks);
                if !stale.is_empty() {
                    warn!(
                        stale = stale.len(),
                        "Checkpoint entries match no current course block; ignoring them"
                    );
                }
                info!(
                    entries = checkpoint.len(),
                    succeeded = checkpoint.success_count(),
                    "Loaded checkpoint"
                );
                checkpoint
            }
            Ok(Some(LoadedCheckpoint::Legacy(pairs))) => adopt_legacy(pairs, blocks),
            Ok(None) => Checkpoint::new(),
            Err(e) => {
                error!(error = %e, "Error loading checkpoint, starting from scratch");
                Checkpoint::new()
            }
        }
    }

    /// Blocks with no settled checkpoint entry, in document order.
    pub fn pending<'a>(&self, blocks: &'a [CourseBlock], checkpoint: &Checkpoint) -> Vec<&'a CourseBlock> {
        let settled = checkpoint.settled_ids(self.retry_failed);
        blocks
            .iter()
            .filter(|b| !settled.contains(b.id.as_str()))
            .collect()
    }

    /// Run the pipeline over whatever `blocks` the checkpoint has not covered.
    ///
    /// With nothing pending, no model call is made and the checkpoint file
    /// is not touched.
    pub async fn resume(&self, blocks: &[CourseBlock]) -> Checkpoint {
        let checkpoint = self.load_checkpoint(blocks).await;
        let pending = self.pending(blocks, &checkpoint);

        if pending.is_empty() {
            info!(blocks = blocks.len(), "All course blocks already processed");
            return checkpoint;
        }

        info!(
            total = blocks.len(),
            done = blocks.len() - pending.len(),
            pending = pending.len(),
            "Resuming extraction"
        );
        self.driver.run(&pending, checkpoint).await
    }
}

/// Attribute legacy `[course, raw]` pairs to blocks by position.
///
/// Legacy files carry no block identity and omit failed blocks, so this is
/// only correct when every earlier block succeeded.
fn adopt_legacy(
    pairs: Vec<(StructuredCourse, Option<String>)>,
    blocks: &[CourseBlock],
) -> Checkpoint {
    warn!(
        entries = pairs.len(),
        "Legacy checkpoint has no block ids; assuming entries match the first blocks in order"
    );
    if pairs.len() > blocks.len() {
        warn!(
            entries = pairs.len(),
            blocks = blocks.len(),
            "Legacy checkpoint is longer than the catalog; extra entries dropped"
        );
    }

    let entries = pairs
        .into_iter()
        .zip(blocks)
        .map(|((course, raw), block)| {
            let extraction = Extraction {
                course: Some(course),
                raw_response: raw,
                failure: None,
            };
            CheckpointEntry::from_extraction(block, extraction)
        })
        .collect();

    Checkpoint::from_entries(entries)
}
