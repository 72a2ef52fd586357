//! Retry/Backoff Engine
//!
//! Applies the enrichment step to one selected result, retrying transient
//! failures with linear backoff (`base_delay * attempt`). Permanent failures
//! and exhausted retries mark the task `FAILED` with the last error kept, so a
//! failed enrichment is distinguishable from one never attempted.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::PipelineConfig;
use crate::error::{EnrichmentError, ProviderError};
use crate::types::{EnrichmentTask, Explanation, ScoredResult};

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Add up to `jitter_ratio * delay` of random extra wait
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_enrichment_retries,
            base_delay: config.retry_base_delay,
            jitter_ratio: if config.retry_jitter { 0.5 } else { 0.0 },
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt that follows failure number `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(attempt);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        delay.mul_f64(1.0 + extra)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentEngine {
    policy: RetryPolicy,
}

impl EnrichmentEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` for `result` until it succeeds, fails permanently, or
    /// `max_retries` attempts have failed.
    ///
    /// `task` is updated in place and is terminal when this returns.
    pub async fn enrich<F, Fut>(
        &self,
        task: &mut EnrichmentTask,
        result: &ScoredResult,
        op: F,
    ) -> Result<Explanation, EnrichmentError>
    where
        F: Fn(ScoredResult) -> Fut,
        Fut: Future<Output = Result<Explanation, ProviderError>>,
    {
        let max_retries = self.policy.max_retries.max(1);

        loop {
            match op(result.clone()).await {
                Ok(explanation) => {
                    task.succeed();
                    debug!(
                        result_id = %result.id,
                        failed_attempts = task.attempt,
                        "Enrichment succeeded"
                    );
                    return Ok(explanation);
                }
                Err(e) => {
                    task.record_failure(e.message.clone());

                    if !e.is_transient() {
                        task.fail();
                        warn!(result_id = %result.id, error = %e, "Enrichment rejected");
                        return Err(EnrichmentError::Rejected {
                            attempts: task.attempt,
                            message: e.message,
                        });
                    }

                    if task.attempt >= max_retries {
                        task.fail();
                        error!(
                            result_id = %result.id,
                            attempts = task.attempt,
                            error = %e,
                            "Enrichment exhausted retries"
                        );
                        return Err(EnrichmentError::Exhausted {
                            attempts: task.attempt,
                            last_error: e.message,
                        });
                    }

                    let delay = self.policy.backoff(task.attempt);
                    warn!(
                        result_id = %result.id,
                        attempt = task.attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Enrichment failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
