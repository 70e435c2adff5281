//! Scripted collaborators for exercising runs, loops and gates without a model
//! or a terminal. Every fake records its calls so tests can assert on them.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::bail;

use crate::cancel::CancelFlag;
use crate::core::critique::Critique;
use crate::feedback::{Rewriter, Transformer, Validator};
use crate::gate::InputSource;
use crate::io::sink::PersistenceSink;

/// One scripted transformer reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(String),
    Fail(String),
}

/// Replies from a script, then falls back to `response {n}`.
#[derive(Debug, Default)]
pub struct ScriptedTransformer {
    script: RefCell<VecDeque<Scripted>>,
    requests: RefCell<Vec<String>>,
}

impl ScriptedTransformer {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn responding(responses: &[&str]) -> Self {
        Self::new(
            responses
                .iter()
                .map(|r| Scripted::Respond((*r).to_string()))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Transformer for ScriptedTransformer {
    type Output = String;

    fn transform(&self, request: &str) -> anyhow::Result<String> {
        self.requests.borrow_mut().push(request.to_string());
        let call = self.calls();
        match self.script.borrow_mut().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => bail!("{message}"),
            None => Ok(format!("response {call}")),
        }
    }
}

/// Rejects until call `accept_on`, accepts from then on.
#[derive(Debug)]
pub struct ScriptedValidator {
    accept_on: Option<u32>,
    fail_on: Option<u32>,
    originals: RefCell<Vec<String>>,
}

impl ScriptedValidator {
    pub fn accepting_on(call: u32) -> Self {
        Self {
            accept_on: Some(call),
            fail_on: None,
            originals: RefCell::new(Vec::new()),
        }
    }

    pub fn always_accepting() -> Self {
        Self::accepting_on(1)
    }

    pub fn never_accepting() -> Self {
        Self {
            accept_on: None,
            fail_on: None,
            originals: RefCell::new(Vec::new()),
        }
    }

    /// Return an error instead of a verdict on call `call`.
    pub fn failing_on(mut self, call: u32) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.originals.borrow().len()
    }

    /// The original request passed to each critique, in call order.
    pub fn originals(&self) -> Vec<String> {
        self.originals.borrow().clone()
    }
}

impl<T: ?Sized> Validator<T> for ScriptedValidator {
    fn critique(&self, original_request: &str, _response: &T) -> anyhow::Result<Critique> {
        self.originals
            .borrow_mut()
            .push(original_request.to_string());
        let call = self.calls() as u32;
        if self.fail_on == Some(call) {
            bail!("critic unavailable on call {call}");
        }
        match self.accept_on {
            Some(first) if call >= first => Ok(Critique::accept(format!("accepted verdict {call}"))),
            _ => Ok(Critique::reject(format!("rejected verdict {call}"))),
        }
    }
}

/// Appends the critique reasoning to the previous request.
#[derive(Debug, Default)]
pub struct RecordingRewriter {
    fail: bool,
    cancel: Option<CancelFlag>,
    previous: RefCell<Vec<String>>,
}

impl RecordingRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Trips `cancel` on every rewrite, as an operator interrupt would.
    pub fn cancelling(cancel: CancelFlag) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.previous.borrow().len()
    }

    pub fn previous_requests(&self) -> Vec<String> {
        self.previous.borrow().clone()
    }
}

impl Rewriter for RecordingRewriter {
    fn rewrite(&self, previous_request: &str, critique: &Critique) -> anyhow::Result<String> {
        self.previous
            .borrow_mut()
            .push(previous_request.to_string());
        if self.fail {
            bail!("rewriter unavailable");
        }
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        Ok(format!(
            "{previous_request}\n[revised: {}]",
            critique.reasoning
        ))
    }
}

/// Operator answers served in order; an empty queue behaves like closed input.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedInput {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| (*a).to_string()).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.answers.borrow_mut().pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("input closed"),
        }
    }
}

/// Keeps persisted documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: RefCell<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.borrow().clone()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.writes
            .borrow()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, content)| content.clone())
    }
}

impl PersistenceSink for MemorySink {
    fn persist(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        self.writes
            .borrow_mut()
            .push((name.to_string(), content.to_string()));
        Ok(PathBuf::from(name))
    }
}

/// A sink that always fails, counting attempts.
#[derive(Debug, Default)]
pub struct FailingSink {
    attempts: Cell<usize>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.get()
    }
}

impl PersistenceSink for FailingSink {
    fn persist(&self, name: &str, _content: &str) -> anyhow::Result<PathBuf> {
        self.attempts.set(self.attempts.get() + 1);
        bail!("disk full while writing {name}")
    }
}
