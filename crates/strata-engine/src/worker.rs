//! Background compression pool.
//!
//! Turn completion queues freshly segmented blocks here so their compressed
//! forms are usually cached before any compaction round needs them. The pool
//! is a dispatcher task fed by an unbounded job channel; each job acquires a
//! semaphore permit, runs the provider call in its own task, and reports back
//! over a results channel. Results are folded into the cache only when the
//! engine drains them at its own safe points, so the pool never touches
//! shared state.
//!
//! Dropping the pool closes the job channel and ends the dispatcher; jobs
//! already in flight finish and their results are discarded with the closed
//! results channel.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::warn;

use strata_llm::Compressor;

use crate::cache::{CacheEntry, CompressionPolicy, compress_text};

/// One block queued for background compression.
struct CompressionJob {
    hash: String,
    text: String,
}

/// Completed background job.
#[derive(Debug)]
pub(crate) struct JobOutcome {
    /// Content hash of the source block.
    pub hash: String,
    /// The cache entry, or `None` when the provider call failed and the
    /// block stays uncached.
    pub entry: Option<CacheEntry>,
    /// Whether a provider call was attempted, for usage accounting.
    pub provider_called: bool,
}

/// Bounded-parallelism compression pool for one engine instance.
pub(crate) struct CompressionPool {
    jobs_tx: mpsc::UnboundedSender<CompressionJob>,
    results_rx: mpsc::UnboundedReceiver<JobOutcome>,
    in_flight: HashSet<String>,
}

impl CompressionPool {
    /// Spawn the dispatcher with at most `max_concurrency` simultaneous
    /// provider calls.
    pub fn new(
        compressor: Arc<dyn Compressor>,
        policy: CompressionPolicy,
        max_concurrency: usize,
    ) -> Self {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<CompressionJob>();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let _ = tokio::spawn(async move {
            while let Some(job) = jobs_rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let compressor = Arc::clone(&compressor);
                let results_tx = results_tx.clone();
                let _ = tokio::spawn(async move {
                    let outcome = match compress_text(compressor.as_ref(), policy, &job.text).await
                    {
                        Ok((entry, provider_called)) => JobOutcome {
                            hash: job.hash,
                            entry: Some(entry),
                            provider_called,
                        },
                        Err(error) => {
                            warn!(
                                hash = %job.hash,
                                category = error.category(),
                                error = %error,
                                "background compression failed, block stays uncached"
                            );
                            JobOutcome {
                                hash: job.hash,
                                entry: None,
                                provider_called: true,
                            }
                        }
                    };
                    drop(permit);
                    let _ = results_tx.send(outcome);
                });
            }
        });

        Self {
            jobs_tx,
            results_rx,
            in_flight: HashSet::new(),
        }
    }

    /// Queue a block unless the same hash is already in flight.
    ///
    /// Returns `true` if the job was queued.
    pub fn enqueue(&mut self, hash: &str, text: &str) -> bool {
        if self.in_flight.contains(hash) {
            return false;
        }
        let job = CompressionJob {
            hash: hash.to_owned(),
            text: text.to_owned(),
        };
        if self.jobs_tx.send(job).is_err() {
            return false;
        }
        let _ = self.in_flight.insert(hash.to_owned());
        true
    }

    /// Collect every completed result without blocking.
    pub fn drain(&mut self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.results_rx.try_recv() {
            let _ = self.in_flight.remove(&outcome.hash);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
