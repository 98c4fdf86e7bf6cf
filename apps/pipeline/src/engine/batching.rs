#![allow(dead_code)]

//! Batch Processor: runs a unit of work over fixed-size slices of a collection.
//!
//! Batches run sequentially with an optional pause between calls to respect
//! external rate limits. A failing batch is logged and dropped. It never
//! aborts the others, and no retry happens at this layer.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::BatchError;

/// A batch that failed and was left out of the results.
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based batch index.
    pub index: usize,
    pub len: usize,
    pub error: BatchError,
}

/// Results of every successful batch, in batch order, plus the skipped ones.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub results: Vec<R>,
    pub failures: Vec<BatchFailure>,
    pub total_batches: usize,
}

impl<R> BatchOutcome<R> {
    /// True when there was work to do and every batch of it failed.
    pub fn all_failed(&self) -> bool {
        self.total_batches > 0 && self.results.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    batch_size: usize,
    delay: Duration,
}

impl BatchProcessor {
    /// A zero batch size is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Pause inserted between consecutive batch calls.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    /// Calls `worker(index, batch)` for each contiguous slice of at most
    /// `batch_size` items. Never fails: worker errors are collected in
    /// `failures` and the batch contributes nothing to `results`.
    pub async fn process<'a, T, R, F, Fut>(&self, items: &'a [T], mut worker: F) -> BatchOutcome<R>
    where
        F: FnMut(usize, &'a [T]) -> Fut,
        Fut: Future<Output = Result<R, BatchError>>,
    {
        let total_batches = self.batch_count(items.len());
        let mut results = Vec::with_capacity(total_batches);
        let mut failures = Vec::new();

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            info!(
                "Processing batch {}/{} ({} items)",
                index + 1,
                total_batches,
                batch.len()
            );

            match worker(index, batch).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    warn!(
                        "Skipping batch {}/{} after failure: {}",
                        index + 1,
                        total_batches,
                        error
                    );
                    failures.push(BatchFailure {
                        index,
                        len: batch.len(),
                        error,
                    });
                }
            }
        }

        info!(
            "{}/{} batches succeeded",
            results.len(),
            total_batches
        );

        BatchOutcome {
            results,
            failures,
            total_batches,
        }
    }
}
