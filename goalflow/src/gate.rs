//! Human-input gate: the acceptance-retry loop with a person as the transformer.
//!
//! The first prompt reaches the operator verbatim. After a rejection the
//! operator sees the rewritten prompt instead.

use crate::cancel::CancelFlag;
use crate::feedback::{
    DEFAULT_MAX_ATTEMPTS, FeedbackLoop, Resolved, RetryError, Rewriter, Transformer, Validator,
};

/// Blocking source of operator text, one line per call.
pub trait InputSource {
    fn read_line(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Adapts an [`InputSource`] to the [`Transformer`] seam.
struct Prompted<'s, S: ?Sized>(&'s S);

impl<S: InputSource + ?Sized> Transformer for Prompted<'_, S> {
    type Output = String;

    fn transform(&self, request: &str) -> anyhow::Result<String> {
        self.0.read_line(request)
    }
}

/// Asks an operator until the validator accepts an answer.
pub struct HumanGate<'c, S: ?Sized, V: ?Sized, R: ?Sized> {
    source: &'c S,
    validator: &'c V,
    rewriter: &'c R,
    max_attempts: u32,
    cancel: Option<CancelFlag>,
}

impl<'c, S, V, R> HumanGate<'c, S, V, R>
where
    S: InputSource + ?Sized,
    V: Validator<String> + ?Sized,
    R: Rewriter + ?Sized,
{
    pub fn new(source: &'c S, validator: &'c V, rewriter: &'c R) -> Self {
        Self {
            source,
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

    /// Ask `prompt` and return the first accepted answer, as typed.
    pub fn ask(&self, prompt: &str) -> Result<String, RetryError> {
        self.ask_resolved(prompt).map(|resolved| resolved.response)
    }

    pub fn ask_resolved(&self, prompt: &str) -> Result<Resolved<String>, RetryError> {
        let prompted = Prompted(self.source);
        let mut feedback = FeedbackLoop::new(&prompted, self.validator, self.rewriter)
            .with_max_attempts(self.max_attempts);
        if let Some(cancel) = &self.cancel {
            feedback = feedback.with_cancel(cancel.clone());
        }
        feedback.resolve(prompt).map_err(|err| match err {
            RetryError::Transformer { attempt, cause } => RetryError::InputSource { attempt, cause },
            other => other,
        })
    }
}
