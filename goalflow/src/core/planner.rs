//! Deterministic next-action selection.
//!
//! Selection scans actions in declaration order and returns the first eligible
//! one, so a fixed state and history always yield the same choice.

use std::fmt;

use serde::Serialize;

use crate::core::action::{Action, Inputs};
use crate::core::registry::ActionRegistry;
use crate::core::state::StateStore;

/// One executed action, as remembered by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    /// 1-indexed step number within the run.
    pub step: u32,
    pub action: String,
    pub output_binding: String,
    /// `(binding, revision)` of every input the action consumed.
    pub input_revisions: Vec<(String, u64)>,
}

/// Ordered log of executed actions for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    records: Vec<ExecutionRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Action names in execution order.
    pub fn actions(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.action.as_str()).collect()
    }

    pub fn last_run(&self, action: &str) -> Option<&ExecutionRecord> {
        self.records.iter().rev().find(|r| r.action == action)
    }

    pub fn times_run(&self, action: &str) -> usize {
        self.records.iter().filter(|r| r.action == action).count()
    }
}

/// Why a blocked action cannot run yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Unmet {
    Precondition { condition: String },
    Input { input: String, reason: String },
    /// The goal's output binding already holds a value, so the goal can never
    /// run.
    OutputPresent { binding: String },
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unmet::Precondition { condition } => write!(f, "precondition '{condition}'"),
            Unmet::Input { input, reason } => write!(f, "input '{input}' ({reason})"),
            Unmet::OutputPresent { binding } => {
                write!(f, "output '{binding}' (already present before the goal ran)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedAction {
    pub action: String,
    pub unmet: Vec<Unmet>,
}

/// Everything that stopped the planner from finding an eligible action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StuckReport {
    pub blocked: Vec<BlockedAction>,
}

impl StuckReport {
    /// Unmet precondition names across all blocked actions, deduplicated in
    /// first-seen order.
    pub fn unmet_preconditions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for blocked in &self.blocked {
            for unmet in &blocked.unmet {
                if let Unmet::Precondition { condition } = unmet
                    && !names.contains(&condition.as_str())
                {
                    names.push(condition);
                }
            }
        }
        names
    }
}

impl fmt::Display for StuckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocked.is_empty() {
            return write!(f, "no runnable action remains");
        }
        let parts: Vec<String> = self
            .blocked
            .iter()
            .map(|b| {
                let unmet: Vec<String> = b.unmet.iter().map(Unmet::to_string).collect();
                format!("'{}' waits on {}", b.action, unmet.join(", "))
            })
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// An action ready to execute, with its inputs already resolved.
#[derive(Debug)]
pub struct Ready<'r, 'a, 's> {
    pub action: &'r Action<'a>,
    pub inputs: Inputs<'s>,
}

#[derive(Debug)]
pub enum Selection<'r, 'a, 's> {
    Ready(Ready<'r, 'a, 's>),
    Stuck(StuckReport),
}

enum Assessment<'s> {
    Ready(Inputs<'s>),
    Blocked(Vec<Unmet>),
    Done,
}

/// Choose the next action to execute.
///
/// Never-executed actions are eligible once their preconditions hold, their
/// inputs resolve, and their output binding does not exist yet. Executed
/// actions are eligible again only when rerunnable and their resolved inputs
/// changed since their last execution.
pub fn select_next<'r, 'a, 's>(
    registry: &'r ActionRegistry<'a>,
    state: &'s StateStore,
    history: &History,
) -> Selection<'r, 'a, 's>
where
    'r: 's,
{
    let mut report = StuckReport::default();
    for action in registry.actions() {
        match assess(registry, action, state, history) {
            Assessment::Ready(inputs) => return Selection::Ready(Ready { action, inputs }),
            Assessment::Blocked(unmet) => report.blocked.push(BlockedAction {
                action: action.name().to_string(),
                unmet,
            }),
            Assessment::Done => {}
        }
    }
    Selection::Stuck(report)
}

fn assess<'s>(
    registry: &'s ActionRegistry<'_>,
    action: &'s Action<'_>,
    state: &'s StateStore,
    history: &History,
) -> Assessment<'s> {
    let last = history.last_run(action.name());
    match last {
        Some(_) if !action.is_rerunnable() => return Assessment::Done,
        None if state.contains(&action.output().binding) => {
            if action.is_goal() {
                return Assessment::Blocked(vec![Unmet::OutputPresent {
                    binding: action.output().binding.clone(),
                }]);
            }
            return Assessment::Done;
        }
        _ => {}
    }

    let mut unmet: Vec<Unmet> = registry
        .conditions()
        .unmet(action.pre(), state)
        .into_iter()
        .map(|condition| Unmet::Precondition {
            condition: condition.to_string(),
        })
        .collect();

    let mut resolved = Vec::with_capacity(action.inputs().len());
    for spec in action.inputs() {
        match state.resolve(spec.type_name, spec.binding.as_deref()) {
            Ok(binding) => resolved.push((spec, binding)),
            Err(err) => unmet.push(Unmet::Input {
                input: spec.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    if !unmet.is_empty() {
        return Assessment::Blocked(unmet);
    }

    let inputs = Inputs::new(resolved);
    if let Some(record) = last
        && record.input_revisions == inputs.revisions()
    {
        return Assessment::Done;
    }
    Assessment::Ready(inputs)
}
