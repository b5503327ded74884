//! Concurrent batch dispatch.
//!
//! [`Dispatcher`] issues one external call per batch, all at once, and
//! collects exactly one [`BatchOutcome`] per batch. A failing, slow or
//! panicking call only ever affects its own slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::analyzer::Analyzer;
use crate::batch::AnalysisBatch;
use crate::client::{CompletionClient, CompletionRequest, Prompt};
use crate::domain::DispatchError;
use crate::metrics::METRICS;

/// Result of dispatching one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum BatchOutcome {
    Success { batch_index: usize, raw: String },
    Failure { batch_index: usize, error: DispatchError },
}

impl BatchOutcome {
    pub fn batch_index(&self) -> usize {
        match self {
            Self::Success { batch_index, .. } | Self::Failure { batch_index, .. } => *batch_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Fans batches out to a shared [`CompletionClient`].
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn CompletionClient>,
    model: String,
    request_timeout: Duration,
    run_deadline: Option<Duration>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            request_timeout: Duration::from_secs(60),
            run_deadline: None,
        }
    }

    /// Bound each external call; a call exceeding it fails its batch only.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound the whole fan-out; batches still pending when it elapses fail.
    pub fn with_run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build one prompt per batch with `analyzer` and dispatch them all.
    ///
    /// Returns one outcome per batch, in batch order.
    pub async fn dispatch<A>(&self, batches: &[AnalysisBatch<'_>], analyzer: &A) -> Vec<BatchOutcome>
    where
        A: Analyzer + ?Sized,
    {
        let prompts = batches.iter().map(|b| analyzer.build_prompt(b)).collect();
        self.dispatch_prompts(prompts).await
    }

    /// Dispatch pre-built prompts concurrently.
    ///
    /// Every prompt runs in its own task and writes only its own slot; the
    /// slots are read after every task has joined (or the run deadline has
    /// elapsed). No outcome is retried.
    #[instrument(skip(self, prompts), fields(batches = prompts.len(), model = %self.model))]
    pub async fn dispatch_prompts(&self, prompts: Vec<Prompt>) -> Vec<BatchOutcome> {
        let total = prompts.len();
        let mut slots: Vec<Option<BatchOutcome>> = vec![None; total];
        if total == 0 {
            return Vec::new();
        }

        METRICS.add_batches_dispatched(total as u64);

        let mut join_set = JoinSet::new();
        let mut task_slots: HashMap<Id, usize> = HashMap::with_capacity(total);
        for (batch_index, prompt) in prompts.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let request = CompletionRequest {
                model: self.model.clone(),
                prompt,
            };
            let timeout = self.request_timeout;
            let handle = join_set.spawn(async move {
                match tokio::time::timeout(timeout, client.complete(request)).await {
                    Ok(Ok(raw)) => BatchOutcome::Success { batch_index, raw },
                    Ok(Err(err)) => BatchOutcome::Failure {
                        batch_index,
                        error: DispatchError::Client(err),
                    },
                    Err(_) => BatchOutcome::Failure {
                        batch_index,
                        error: DispatchError::Timeout {
                            after_ms: timeout.as_millis() as u64,
                        },
                    },
                }
            });
            task_slots.insert(handle.id(), batch_index);
        }

        let deadline = self.run_deadline.map(|d| Instant::now() + d);
        let mut deadline_hit = false;
        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, join_set.join_next_with_id()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        debug!(pending = join_set.len(), "run deadline elapsed; aborting pending batches");
                        join_set.abort_all();
                        deadline_hit = true;
                        break;
                    }
                },
                None => join_set.join_next_with_id().await,
            };
            match joined {
                None => break,
                Some(Ok((_, outcome))) => {
                    let idx = outcome.batch_index();
                    slots[idx] = Some(outcome);
                }
                Some(Err(join_err)) => {
                    let Some(&batch_index) = task_slots.get(&join_err.id()) else {
                        debug!(error = %join_err, "join error for an unknown task");
                        continue;
                    };
                    slots[batch_index] = Some(BatchOutcome::Failure {
                        batch_index,
                        error: DispatchError::TaskFailed(join_err.to_string()),
                    });
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(batch_index, slot)| {
                slot.unwrap_or_else(|| {
                    let error = if deadline_hit {
                        DispatchError::DeadlineExceeded
                    } else {
                        DispatchError::TaskFailed("task ended without an outcome".to_string())
                    };
                    BatchOutcome::Failure { batch_index, error }
                })
            })
            .collect()
    }
}
