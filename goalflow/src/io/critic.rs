//! Model-backed validator and rewriter.
//!
//! Both ask a critic transformer. The critic's verdict must be a JSON object
//! matching `schemas/critique.schema.json`; prose or code fences around the
//! object are tolerated.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::critique::Critique;
use crate::feedback::{Rewriter, Transformer, Validator};
use crate::io::prompt::PromptEngine;

const CRITIQUE_SCHEMA: &str = include_str!("../../schemas/critique.schema.json");

static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json object pattern should compile"));

static CRITIQUE_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(CRITIQUE_SCHEMA).expect("critique schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("critique schema should compile")
});

/// Parse a critic answer into a [`Critique`].
pub fn parse_critique(raw: &str) -> Result<Critique> {
    let object = JSON_OBJECT_RE
        .find(raw)
        .ok_or_else(|| anyhow!("critic answer holds no JSON object: {}", preview(raw)))?;
    let value: Value = serde_json::from_str(object.as_str())
        .with_context(|| format!("parse critic verdict {}", preview(object.as_str())))?;
    let messages: Vec<String> = CRITIQUE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("critic verdict failed schema validation:\n- {}", messages.join("\n- "));
    }
    serde_json::from_value(value).context("decode critic verdict")
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    let trimmed = text.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(LIMIT).collect();
    format!("{head}...")
}

/// Judges responses by asking the critic whether they are in line with the
/// original request.
pub struct ModelCritic<'c, T: ?Sized> {
    critic: &'c T,
    prompts: &'c PromptEngine,
}

impl<'c, T> ModelCritic<'c, T>
where
    T: Transformer<Output = String> + ?Sized,
{
    pub fn new(critic: &'c T, prompts: &'c PromptEngine) -> Self {
        Self { critic, prompts }
    }
}

impl<T, R> Validator<R> for ModelCritic<'_, T>
where
    T: Transformer<Output = String> + ?Sized,
    R: AsRef<str> + ?Sized,
{
    #[instrument(skip_all)]
    fn critique(&self, original_request: &str, response: &R) -> Result<Critique> {
        let prompt = self
            .prompts
            .render_critique(original_request, response.as_ref())?;
        let answer = self.critic.transform(&prompt).context("ask critic")?;
        let critique = parse_critique(&answer)?;
        debug!(accepted = critique.accepted, "critic verdict");
        Ok(critique)
    }
}

/// Rewrites a rejected request from the critic's reasoning.
pub struct ModelRewriter<'c, T: ?Sized> {
    critic: &'c T,
    prompts: &'c PromptEngine,
}

impl<'c, T> ModelRewriter<'c, T>
where
    T: Transformer<Output = String> + ?Sized,
{
    pub fn new(critic: &'c T, prompts: &'c PromptEngine) -> Self {
        Self { critic, prompts }
    }
}

impl<T> Rewriter for ModelRewriter<'_, T>
where
    T: Transformer<Output = String> + ?Sized,
{
    #[instrument(skip_all)]
    fn rewrite(&self, previous_request: &str, critique: &Critique) -> Result<String> {
        let prompt = self
            .prompts
            .render_rewrite(previous_request, &critique.reasoning)?;
        let rewritten = self.critic.transform(&prompt).context("ask for rewrite")?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            bail!("rewrite came back empty");
        }
        Ok(rewritten.to_string())
    }
}
