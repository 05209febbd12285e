//! Language-model advice on the strongest candidates.
//!
//! The top candidates are each described in a prompt and sent to the
//! model. A failure only costs that candidate its advisory text.

pub mod client;
pub mod prompt;

pub use client::{AdvisoryConfig, ChatClient};
pub use prompt::{build_prompt, PromptContext};

use crate::analysis::top_n;
use crate::error::{PipelineError, Result};
use crate::models::Candidate;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Something that turns a prompt into advisory text.
#[allow(async_fn_in_trait)]
pub trait AdvisoryBackend {
    async fn advise(&self, prompt: &str) -> Result<String>;
}

/// Outcome of a single API call, before retry handling.
#[derive(Debug)]
pub enum CallError {
    /// The API asked us to slow down (HTTP 429).
    RateLimited,
    Failed(PipelineError),
}

/// Run `call`, retrying up to `max_retries` times on rate limiting.
pub async fn retry_rate_limited<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(CallError::RateLimited) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    "Rate limit hit, retrying in {:.1}s ({}/{})",
                    backoff.as_secs_f64(),
                    attempt,
                    max_retries
                );
                tokio::time::sleep(backoff).await;
            }
            Err(CallError::RateLimited) => {
                return Err(PipelineError::Advisory(format!(
                    "still rate limited after {} retries",
                    max_retries
                )))
            }
            Err(CallError::Failed(err)) => return Err(err),
        }
    }
}

/// Counts from one advisory pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvisoryOutcome {
    pub advised: usize,
    pub failed: usize,
}

/// Ask `backend` about the `top` strongest candidates and attach the answers.
///
/// Up to `concurrency` requests are in flight at once; answers are applied
/// in ranking order either way.
pub async fn advise_top<B: AdvisoryBackend>(
    backend: &B,
    candidates: &mut [Candidate],
    top: usize,
    concurrency: usize,
    ctx: &PromptContext,
) -> AdvisoryOutcome {
    let selected = top_n(candidates, top);
    info!(
        "Requesting advice for {} of {} candidates",
        selected.len(),
        candidates.len()
    );

    let requests: Vec<(usize, usize, String)> = selected
        .iter()
        .enumerate()
        .map(|(i, &idx)| (i + 1, idx, build_prompt(i + 1, &candidates[idx], ctx)))
        .collect();

    let results: Vec<(usize, usize, Result<String>)> = stream::iter(requests)
        .map(|(rank, idx, prompt)| async move {
            let result = backend.advise(&prompt).await;
            (rank, idx, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = AdvisoryOutcome::default();
    for (rank, idx, result) in results {
        let candidate = &mut candidates[idx];
        match result {
            Ok(text) => {
                info!("Site {} (tile {}) advice received", rank, candidate.tile.id);
                candidate.advisory = Some(text);
                outcome.advised += 1;
            }
            Err(e) => {
                error!("Advice failed for site {} (tile {}): {}", rank, candidate.tile.id, e);
                candidate.advisory = None;
                outcome.failed += 1;
            }
        }
    }

    outcome
}
