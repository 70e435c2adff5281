//! Acceptance-retry loop: transform, critique, rewrite, try again.
//!
//! The loop is strictly sequential. Each attempt finishes its transformer call
//! and its critique before the next attempt's request is rewritten. Critiques
//! always judge the original request, so rewriting can never lower the bar.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::core::critique::Critique;

/// Attempt bound used when callers do not pick one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maps a request to a candidate response (e.g. a generative-model call).
pub trait Transformer {
    type Output;

    fn transform(&self, request: &str) -> anyhow::Result<Self::Output>;
}

/// Judges a response against the request that was originally asked.
pub trait Validator<T: ?Sized> {
    fn critique(&self, original_request: &str, response: &T) -> anyhow::Result<Critique>;
}

/// Produces the next request from the previous one and its rejection.
pub trait Rewriter {
    fn rewrite(&self, previous_request: &str, critique: &Critique) -> anyhow::Result<String>;
}

/// Retry-loop failures. Collaborator failures abort immediately; they never
/// count as a rejection.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("no acceptable response after {attempts} attempts: {reasoning}")]
    Exhausted { attempts: u32, reasoning: String },

    #[error("transformer failed on attempt {attempt}: {cause:#}")]
    Transformer { attempt: u32, cause: anyhow::Error },

    #[error("validator failed on attempt {attempt}: {cause:#}")]
    Validator { attempt: u32, cause: anyhow::Error },

    #[error("rewrite failed after attempt {attempt}: {cause:#}")]
    Rewrite { attempt: u32, cause: anyhow::Error },

    #[error("input source failed on attempt {attempt}: {cause:#}")]
    InputSource { attempt: u32, cause: anyhow::Error },

    #[error("cancelled before attempt {attempt}")]
    Cancelled { attempt: u32 },

    #[error("max_attempts must be > 0")]
    InvalidMaxAttempts,
}

/// An accepted response and how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub response: T,
    /// 1-indexed attempt that produced the accepted response.
    pub attempts: u32,
    pub critique: Critique,
}

/// Bounded accept/retry loop over borrowed collaborators.
pub struct FeedbackLoop<'c, T: ?Sized, V: ?Sized, R: ?Sized> {
    transformer: &'c T,
    validator: &'c V,
    rewriter: &'c R,
    max_attempts: u32,
    cancel: Option<CancelFlag>,
}

impl<'c, T, V, R> FeedbackLoop<'c, T, V, R>
where
    T: Transformer + ?Sized,
    V: Validator<T::Output> + ?Sized,
    R: Rewriter + ?Sized,
{
    pub fn new(transformer: &'c T, validator: &'c V, rewriter: &'c R) -> Self {
        Self {
            transformer,
            validator,
            rewriter,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cancel: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the loop until a response is accepted or attempts run out.
    ///
    /// For `max_attempts = N`: at most N transformer and N validator calls,
    /// and N-1 rewrites on the failing path.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub fn resolve(&self, initial_request: &str) -> Result<Resolved<T::Output>, RetryError> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidMaxAttempts);
        }

        let mut request = initial_request.to_string();
        let mut attempt = 1u32;
        loop {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                return Err(RetryError::Cancelled { attempt });
            }

            debug!(attempt, "requesting response");
            let response = self
                .transformer
                .transform(&request)
                .map_err(|cause| RetryError::Transformer { attempt, cause })?;
            let critique = self
                .validator
                .critique(initial_request, &response)
                .map_err(|cause| RetryError::Validator { attempt, cause })?;

            if critique.accepted {
                info!(attempt, "response accepted");
                return Ok(Resolved {
                    response,
                    attempts: attempt,
                    critique,
                });
            }

            warn!(attempt, reasoning = %critique.reasoning, "response rejected");
            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    reasoning: critique.reasoning,
                });
            }

            request = self
                .rewriter
                .rewrite(&request, &critique)
                .map_err(|cause| RetryError::Rewrite { attempt, cause })?;
            debug!(attempt, "request rewritten");
            attempt += 1;
        }
    }
}

/// One-shot form of [`FeedbackLoop::resolve`] returning just the response.
pub fn resolve_with_feedback<T, V, R>(
    transformer: &T,
    validator: &V,
    rewriter: &R,
    initial_request: &str,
    max_attempts: u32,
) -> Result<T::Output, RetryError>
where
    T: Transformer + ?Sized,
    V: Validator<T::Output> + ?Sized,
    R: Rewriter + ?Sized,
{
    FeedbackLoop::new(transformer, validator, rewriter)
        .with_max_attempts(max_attempts)
        .resolve(initial_request)
        .map(|resolved| resolved.response)
}
