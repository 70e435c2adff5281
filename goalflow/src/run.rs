//! One run of a workflow: select, execute, commit, repeat until the goal.
//!
//! A [`Run`] owns its State Store and history. Nothing is shared between runs,
//! so two runs over the same registry never observe each other's bindings.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::core::error::FlowError;
use crate::core::planner::{ExecutionRecord, History, Selection, select_next};
use crate::core::registry::ActionRegistry;
use crate::core::state::StateStore;
use crate::feedback::RetryError;
use crate::io::sink::PersistenceSink;

/// Executed-action bound used when callers do not pick one.
pub const DEFAULT_MAX_STEPS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on executed actions, including reruns.
    pub max_steps: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Summary of one executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: u32,
    pub action: String,
    pub output_binding: String,
    pub goal_reached: bool,
    pub duration_ms: u64,
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub goal_action: String,
    pub output_binding: String,
    /// The goal action's output, as stored.
    pub output: Value,
    pub state: StateStore,
    pub history: History,
}

impl RunResult {
    pub fn output_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.output.clone())
    }

    /// Strings verbatim, anything else as pretty JSON.
    pub fn render_output(&self) -> String {
        match &self.output {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

pub struct Run<'r, 'a> {
    registry: &'r ActionRegistry<'a>,
    options: RunOptions,
    state: StateStore,
    history: History,
    cancel: Option<CancelFlag>,
    finished: bool,
    /// First fatal error; once set the run never executes again.
    aborted: Option<String>,
}

impl<'r, 'a> Run<'r, 'a> {
    pub fn new(registry: &'r ActionRegistry<'a>, options: RunOptions) -> Self {
        Self {
            registry,
            options,
            state: StateStore::new(),
            history: History::new(),
            cancel: None,
            finished: false,
            aborted: None,
        }
    }

    /// Start from pre-seeded bindings instead of an empty store.
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = state;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Message of the fatal error that ended the run, if any.
    pub fn aborted(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// Execute exactly one action.
    ///
    /// The output is committed only once the body succeeded; a failed action
    /// leaves the store untouched. Postconditions are checked against the
    /// store after the commit. Any error other than
    /// [`FlowError::Finished`] aborts the run: later calls return
    /// [`FlowError::Aborted`] without executing anything.
    #[instrument(skip_all, fields(step = self.history.len() + 1))]
    pub fn step(&mut self) -> Result<StepOutcome, FlowError> {
        if let Some(cause) = &self.aborted {
            return Err(FlowError::Aborted {
                cause: cause.clone(),
            });
        }
        let outcome = self.advance();
        if let Err(err) = &outcome
            && !matches!(err, FlowError::Finished { .. })
        {
            self.aborted = Some(err.to_string());
        }
        outcome
    }

    fn advance(&mut self) -> Result<StepOutcome, FlowError> {
        let registry = self.registry;
        if self.finished {
            return Err(FlowError::Finished {
                goal: registry.goal().name().to_string(),
            });
        }

        let steps = self.history.len() as u32;
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(FlowError::Cancelled { steps });
        }
        if steps >= self.options.max_steps {
            warn!(max_steps = self.options.max_steps, "step limit reached");
            return Err(FlowError::StepLimitExceeded {
                max_steps: self.options.max_steps,
            });
        }

        let started = Instant::now();
        let (action, executed) = match select_next(registry, &self.state, &self.history) {
            Selection::Ready(ready) => {
                info!(action = ready.action.name(), "executing action");
                let revisions = ready.inputs.revisions();
                let executed = ready.action.execute(&ready.inputs);
                (ready.action, executed.map(|value| (value, revisions)))
            }
            Selection::Stuck(report) => {
                warn!(%report, "planning stuck");
                return Err(FlowError::PlanningStuck(report));
            }
        };
        let (value, input_revisions) =
            executed.map_err(|cause| classify_failure(action.name(), cause))?;

        let output = action.output();
        let revision = self
            .state
            .insert_value(&output.binding, output.type_name, value);
        debug!(binding = %output.binding, revision, "output committed");

        let step = steps + 1;
        self.history.record(ExecutionRecord {
            step,
            action: action.name().to_string(),
            output_binding: output.binding.clone(),
            input_revisions,
        });

        for condition in action.post() {
            if !registry.conditions().evaluate(condition, &self.state) {
                warn!(action = action.name(), %condition, "postcondition false");
                return Err(FlowError::PostconditionViolation {
                    action: action.name().to_string(),
                    condition: condition.clone(),
                });
            }
        }

        let goal_reached = action.is_goal();
        if goal_reached {
            info!(goal = action.name(), steps = step, "goal reached");
            self.finished = true;
        }

        Ok(StepOutcome {
            step,
            action: action.name().to_string(),
            output_binding: output.binding.clone(),
            goal_reached,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Step until the goal action has run, reporting each step to `on_step`.
    ///
    /// On error the run keeps its state and history, so callers can still
    /// inspect or journal them.
    pub fn run_to_goal<F: FnMut(&StepOutcome)>(
        &mut self,
        mut on_step: F,
    ) -> Result<RunResult, FlowError> {
        loop {
            let outcome = self.step()?;
            on_step(&outcome);
            if outcome.goal_reached {
                return Ok(self.result());
            }
        }
    }

    /// Snapshot of the finished run, or `None` before the goal has run.
    pub fn finished_result(&self) -> Option<RunResult> {
        self.finished.then(|| self.result())
    }

    fn result(&self) -> RunResult {
        let goal = self.registry.goal();
        let output_binding = goal.output().binding.clone();
        let output = self
            .state
            .binding(&output_binding)
            .map(|b| b.value.clone())
            .unwrap_or(Value::Null);
        RunResult {
            goal_action: goal.name().to_string(),
            output_binding,
            output,
            state: self.state.clone(),
            history: self.history.clone(),
        }
    }
}

/// Action failures whose cause is an exhausted retry loop get their own kind.
fn classify_failure(action: &str, cause: anyhow::Error) -> FlowError {
    if let Some(RetryError::Exhausted {
        attempts,
        reasoning,
    }) = cause.downcast_ref::<RetryError>()
    {
        warn!(action, attempts, "retry budget exhausted");
        return FlowError::RetryExhausted {
            action: action.to_string(),
            attempts: *attempts,
            reasoning: reasoning.clone(),
        };
    }
    warn!(action, error = %format!("{cause:#}"), "action failed");
    FlowError::ActionFailed {
        action: action.to_string(),
        cause,
    }
}

/// Hand the rendered goal output to `sink` under `name`.
///
/// On failure the result stays with the caller, so it can be retried or
/// written elsewhere.
pub fn persist_result<S: PersistenceSink + ?Sized>(
    sink: &S,
    name: &str,
    result: &RunResult,
) -> Result<PathBuf, FlowError> {
    sink.persist(name, &result.render_output())
        .map_err(|cause| FlowError::Persistence {
            name: name.to_string(),
            cause,
        })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;
    use crate::core::action::Action;
    use crate::core::condition::Condition;
    use crate::test_support::{FailingSink, MemorySink};

    fn two_step_registry() -> ActionRegistry<'static> {
        ActionRegistry::builder()
            .condition(Condition::present_named::<String>("greeted", "greeting"))
            .action(
                Action::builder("greet")
                    .post("greeted")
                    .output_binding("greeting")
                    .run(|_| Ok("hello".to_string())),
            )
            .action(
                Action::builder("shout")
                    .input_named::<String>("greeting")
                    .pre("greeted")
                    .output_binding("report")
                    .goal()
                    .run(|inputs| Ok(inputs.named::<String>("greeting")?.to_uppercase())),
            )
            .build()
            .expect("registry")
    }

    #[test]
    fn run_to_goal_reports_every_step() {
        let registry = two_step_registry();
        let mut seen = Vec::new();
        let result = Run::new(&registry, RunOptions::default())
            .run_to_goal(|outcome| seen.push(outcome.clone()))
            .expect("run");

        assert_eq!(result.goal_action, "shout");
        assert_eq!(result.render_output(), "HELLO");
        assert_eq!(result.output_as::<String>().expect("decode"), "HELLO");
        assert_eq!(result.history.actions(), vec!["greet", "shout"]);
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].goal_reached);
        assert!(seen[1].goal_reached);
        assert_eq!(seen[1].step, 2);
    }

    #[test]
    fn stepping_after_the_goal_is_an_error() {
        let registry = two_step_registry();
        let mut run = Run::new(&registry, RunOptions::default());
        run.step().expect("greet");
        assert!(run.finished_result().is_none());
        run.step().expect("shout");
        assert!(run.is_finished());
        assert_eq!(
            run.finished_result().expect("result").render_output(),
            "HELLO"
        );
        let err = run.step().unwrap_err();
        assert!(matches!(err, FlowError::Finished { ref goal } if goal == "shout"));
    }

    #[test]
    fn false_postcondition_aborts_the_run() {
        let registry = ActionRegistry::builder()
            .condition(Condition::new("never", |_| false))
            .action(
                Action::builder("lie")
                    .post("never")
                    .goal()
                    .run(|_| Ok(true)),
            )
            .build()
            .expect("registry");

        let err = Run::new(&registry, RunOptions::default())
            .run_to_goal(|_| {})
            .unwrap_err();
        match err {
            FlowError::PostconditionViolation { action, condition } => {
                assert_eq!(action, "lie");
                assert_eq!(condition, "never");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_action_leaves_store_untouched() {
        let registry = ActionRegistry::builder()
            .action(
                Action::builder("explode")
                    .goal()
                    .run(|_| -> anyhow::Result<bool> { Err(anyhow!("boom")) }),
            )
            .build()
            .expect("registry");

        let mut run = Run::new(&registry, RunOptions::default());
        let err = run.step().unwrap_err();
        assert!(matches!(err, FlowError::ActionFailed { ref action, .. } if action == "explode"));
        assert!(err.to_string().contains("boom"));
        assert!(run.state().is_empty());
        assert!(run.history().is_empty());
    }

    #[test]
    fn exhausted_retry_is_classified_separately() {
        let registry = ActionRegistry::builder()
            .action(
                Action::builder("draft")
                    .goal()
                    .run(|_| -> anyhow::Result<String> {
                        Err(anyhow::Error::new(RetryError::Exhausted {
                            attempts: 5,
                            reasoning: "still vague".into(),
                        }))
                    }),
            )
            .build()
            .expect("registry");

        let err = Run::new(&registry, RunOptions::default())
            .run_to_goal(|_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::RetryExhausted { ref action, attempts: 5, ref reasoning }
                if action == "draft" && reasoning == "still vague"
        ));
    }

    #[test]
    fn violated_postcondition_stays_fatal_on_the_next_call() {
        let registry = ActionRegistry::builder()
            .condition(Condition::new("never", |_| false))
            .action(
                Action::builder("broken")
                    .post("never")
                    .output_binding("half")
                    .run(|_| Ok(true)),
            )
            .action(
                Action::builder("finish")
                    .output_binding("report")
                    .goal()
                    .run(|_| Ok("done".to_string())),
            )
            .build()
            .expect("registry");

        let mut run = Run::new(&registry, RunOptions::default());
        let first = run.run_to_goal(|_| {}).unwrap_err();
        assert!(matches!(first, FlowError::PostconditionViolation { .. }));

        let second = run.run_to_goal(|_| {}).unwrap_err();
        assert!(
            matches!(second, FlowError::Aborted { ref cause } if cause.contains("'never'")),
            "{second}"
        );
        assert_eq!(run.history().actions(), vec!["broken"]);
        assert!(!run.state().contains("report"));
        assert!(run.finished_result().is_none());
        assert!(run.aborted().is_some());
    }

    #[test]
    fn exhausted_action_is_not_retried_by_another_step() {
        let calls = Cell::new(0);
        let registry = ActionRegistry::builder()
            .action(
                Action::builder("draft")
                    .goal()
                    .run(|_| -> anyhow::Result<String> {
                        calls.set(calls.get() + 1);
                        if calls.get() == 1 {
                            return Err(anyhow::Error::new(RetryError::Exhausted {
                                attempts: 5,
                                reasoning: "still vague".into(),
                            }));
                        }
                        Ok("late draft".into())
                    }),
            )
            .build()
            .expect("registry");

        let mut run = Run::new(&registry, RunOptions::default());
        assert!(matches!(
            run.step().unwrap_err(),
            FlowError::RetryExhausted { .. }
        ));
        assert!(matches!(run.step().unwrap_err(), FlowError::Aborted { .. }));
        assert_eq!(calls.get(), 1);
        assert!(!run.is_finished());
    }

    #[test]
    fn self_feeding_rerun_hits_the_step_limit() {
        // echo first reads the seed, then keeps reading its own fresh output
        let registry = ActionRegistry::builder()
            .action(
                Action::builder("echo")
                    .input::<String>()
                    .rerunnable()
                    .run(|inputs| Ok(format!("{}!", inputs.get::<String>()?))),
            )
            .action(
                Action::builder("finish")
                    .input_named::<bool>("never")
                    .goal()
                    .run(|_| Ok(true)),
            )
            .build()
            .expect("registry");

        let mut seed = StateStore::new();
        seed.insert("seed", &"hey".to_string()).expect("seed");
        let mut steps = 0;
        let err = Run::new(&registry, RunOptions { max_steps: 5 })
            .with_state(seed)
            .run_to_goal(|_| steps += 1)
            .unwrap_err();
        assert!(matches!(err, FlowError::StepLimitExceeded { max_steps: 5 }));
        assert_eq!(steps, 5);
    }

    #[test]
    fn unreachable_goal_is_stuck() {
        let registry = ActionRegistry::builder()
            .condition(Condition::present_named::<bool>("approved", "approval"))
            .action(
                Action::builder("publish")
                    .pre("approved")
                    .goal()
                    .run(|_| Ok(true)),
            )
            .build()
            .expect("registry");

        let err = Run::new(&registry, RunOptions::default())
            .run_to_goal(|_| {})
            .unwrap_err();
        let FlowError::PlanningStuck(report) = err else {
            panic!("expected stuck, got {err}");
        };
        assert_eq!(report.unmet_preconditions(), vec!["approved"]);
    }

    #[test]
    fn cancellation_stops_between_steps() {
        let cancel = CancelFlag::new();
        let registry = two_step_registry();
        let calls = Cell::new(0);
        let err = Run::new(&registry, RunOptions::default())
            .with_cancel(cancel.clone())
            .run_to_goal(|_| {
                calls.set(calls.get() + 1);
                cancel.cancel();
            })
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled { steps: 1 }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn persistence_failure_keeps_the_result() {
        let registry = two_step_registry();
        let result = Run::new(&registry, RunOptions::default())
            .run_to_goal(|_| {})
            .expect("run");

        let failing = FailingSink::new();
        let err = persist_result(&failing, "report.md", &result).unwrap_err();
        assert!(matches!(err, FlowError::Persistence { ref name, .. } if name == "report.md"));
        assert_eq!(failing.attempts(), 1);

        let sink = MemorySink::new();
        let path = persist_result(&sink, "report.md", &result).expect("persist");
        assert_eq!(path, PathBuf::from("report.md"));
        assert_eq!(sink.get("report.md").as_deref(), Some("HELLO"));
    }

    #[test]
    fn non_string_output_renders_as_json() {
        let registry = ActionRegistry::builder()
            .action(Action::builder("decide").goal().run(|_| Ok(true)))
            .build()
            .expect("registry");
        let result = Run::new(&registry, RunOptions::default())
            .run_to_goal(|_| {})
            .expect("run");
        assert_eq!(result.output_binding, "bool");
        assert_eq!(result.render_output(), "true");
    }
}
