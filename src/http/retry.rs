//! Retry policy and the retry stage
//!
//! The policy is a pure decision function over `(attempt, outcome)`. The
//! stage drives it: it replays the request through the inner stages and
//! sleeps between attempts.

use super::middleware::{Middleware, MiddlewareFuture, Next};
use crate::config::ClientOptions;
use crate::error::TransportError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::Request;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Status codes worth another attempt
pub const RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Cap applied when no maximum delay is configured
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(180);

/// Header telling the server which retry this is
pub const RETRY_ATTEMPT_HEADER: &str = "retry-attempt";

/// What happened to one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No response at all (connect failure, reset, timeout)
    TransportFailure,
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },
}

impl Outcome {
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            retry_after: None,
        }
    }

    pub fn from_response(status: u16, headers: &HeaderMap) -> Self {
        Self::Status {
            status,
            retry_after: retry_after(headers),
        }
    }
}

/// Verdict for one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    const STOP: Self = Self {
        retry: false,
        delay: Duration::ZERO,
    };
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Exponential backoff policy with jitter
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable_status_codes: Vec<u16>,
    rng: Arc<Mutex<StdRng>>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            retryable_status_codes: RETRYABLE_STATUS_CODES.to_vec(),
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Policy from the transport options; a zero maximum delay means 180 s
    pub fn from_options(options: &ClientOptions) -> Self {
        let max_delay = match options.max_retry_delay_seconds {
            0 => DEFAULT_MAX_DELAY,
            secs => Duration::from_secs(secs),
        };
        Self::new(
            options.max_retries,
            Duration::from_secs(options.retry_delay_seconds),
            max_delay,
        )
    }

    /// Use a seeded jitter source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    fn eligible(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::TransportFailure => true,
            Outcome::Status { status, .. } => self.retryable_status_codes.contains(status),
        }
    }

    /// Decide with a jitter drawn uniformly from `[0, base_delay)`
    pub fn should_retry(&self, attempt: u32, outcome: &Outcome) -> RetryDecision {
        if attempt >= self.max_attempts || !self.eligible(outcome) {
            return RetryDecision::STOP;
        }

        let base_nanos = self.base_delay.as_nanos().min(u64::MAX as u128) as u64;
        let jitter = if base_nanos > 0 {
            Duration::from_nanos(self.rng.lock().gen_range(0..base_nanos))
        } else {
            Duration::ZERO
        };

        self.should_retry_with_jitter(attempt, outcome, jitter)
    }

    /// Decide with an explicit jitter
    pub fn should_retry_with_jitter(
        &self,
        attempt: u32,
        outcome: &Outcome,
        jitter: Duration,
    ) -> RetryDecision {
        if attempt >= self.max_attempts || !self.eligible(outcome) {
            return RetryDecision::STOP;
        }

        let factor = 2u32.saturating_pow(attempt);
        let mut delay = self
            .base_delay
            .saturating_mul(factor)
            .saturating_add(jitter);

        if let Outcome::Status {
            retry_after: Some(wait),
            ..
        } = outcome
        {
            delay = delay.max(*wait);
        }

        RetryDecision {
            retry: true,
            delay: delay.min(self.max_delay),
        }
    }
}

/// Stage replaying failed requests according to a [`RetryPolicy`]
#[derive(Debug)]
pub struct RetryStage {
    policy: RetryPolicy,
}

impl RetryStage {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Middleware for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let mut attempt = 0u32;

            loop {
                // Streaming bodies cannot be replayed
                let Some(mut this_try) = req.try_clone() else {
                    tracing::debug!("Request body is not cloneable, sending without retry");
                    return next.run(req).await;
                };
                if attempt > 0 {
                    this_try
                        .headers_mut()
                        .insert(RETRY_ATTEMPT_HEADER, HeaderValue::from(attempt));
                }

                let result = next.run(this_try).await;
                let outcome = match &result {
                    Ok(response) => Some(Outcome::from_response(
                        response.status().as_u16(),
                        response.headers(),
                    )),
                    Err(TransportError::Request(_)) => Some(Outcome::TransportFailure),
                    Err(_) => None,
                };
                let Some(outcome) = outcome else {
                    return result;
                };

                let decision = self.policy.should_retry(attempt, &outcome);
                if !decision.retry {
                    if attempt > 0 {
                        tracing::debug!("Giving up after {} retries", attempt);
                    }
                    return result;
                }

                tracing::warn!(
                    "Retrying {} {} in {:?} (attempt {}/{}, outcome {:?})",
                    req.method(),
                    req.url().path(),
                    decision.delay,
                    attempt + 1,
                    self.policy.max_attempts,
                    outcome
                );
                drop(result);
                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
        })
    }
}
