//! Error taxonomy for registry construction, binding lookup, and runs.

use thiserror::Error;

use crate::core::planner::StuckReport;
use crate::feedback::RetryError;

/// Registry construction failures. A registry that fails to build never runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} name must be non-empty")]
    EmptyName { kind: &'static str },

    #[error("duplicate action '{0}'")]
    DuplicateAction(String),

    #[error("duplicate condition '{0}'")]
    DuplicateCondition(String),

    #[error("action '{action}' references unknown condition '{condition}'")]
    UnknownCondition { action: String, condition: String },

    #[error("no action is marked as the goal")]
    NoGoal,

    #[error("multiple goal actions: {}", .0.join(", "))]
    MultipleGoals(Vec<String>),
}

/// Typed binding resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no binding of type '{type_name}'{}", name_suffix(.name))]
    Absent {
        type_name: String,
        name: Option<String>,
    },

    #[error("ambiguous binding of type '{type_name}': {}", .candidates.join(", "))]
    Ambiguous {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("binding '{name}' holds '{found}', expected '{expected}'")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("binding '{name}' is not a valid '{type_name}': {message}")]
    Decode {
        name: String,
        type_name: String,
        message: String,
    },
}

fn name_suffix(name: &Option<String>) -> String {
    name.as_deref()
        .map(|n| format!(" named '{n}'"))
        .unwrap_or_default()
}

/// Fatal run failures. Every variant aborts the run; nothing is retried here.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("planning stuck: {0}")]
    PlanningStuck(StuckReport),

    #[error("action '{action}' left postcondition '{condition}' false")]
    PostconditionViolation { action: String, condition: String },

    #[error("action '{action}' exhausted {attempts} attempts without acceptance: {reasoning}")]
    RetryExhausted {
        action: String,
        attempts: u32,
        reasoning: String,
    },

    #[error("action '{action}' failed: {cause:#}")]
    ActionFailed {
        action: String,
        cause: anyhow::Error,
    },

    #[error("run exceeded max_steps {max_steps} without reaching the goal")]
    StepLimitExceeded { max_steps: u32 },

    #[error("run cancelled after {steps} steps")]
    Cancelled { steps: u32 },

    #[error("run already finished: goal '{goal}' has executed")]
    Finished { goal: String },

    #[error("run aborted earlier: {cause}")]
    Aborted { cause: String },

    #[error("failed to persist '{name}': {cause:#}")]
    Persistence { name: String, cause: anyhow::Error },
}

impl FlowError {
    /// The retry-loop failure behind an action failure, if any.
    pub fn retry_error(&self) -> Option<&RetryError> {
        match self {
            FlowError::ActionFailed { cause, .. } => cause.downcast_ref::<RetryError>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_messages_name_the_binding() {
        let absent = LookupError::Absent {
            type_name: "riskProfile".into(),
            name: Some("answer".into()),
        };
        assert_eq!(
            absent.to_string(),
            "no binding of type 'riskProfile' named 'answer'"
        );

        let ambiguous = LookupError::Ambiguous {
            type_name: "string".into(),
            candidates: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            ambiguous.to_string(),
            "ambiguous binding of type 'string': a, b"
        );
    }

    #[test]
    fn multiple_goals_lists_every_goal() {
        let err = RegistryError::MultipleGoals(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "multiple goal actions: a, b");
    }

    #[test]
    fn retry_error_is_recovered_through_context() {
        let cause = anyhow::Error::new(RetryError::Exhausted {
            attempts: 2,
            reasoning: "too vague".into(),
        })
        .context("draft plan");
        let err = FlowError::ActionFailed {
            action: "draft".into(),
            cause,
        };
        assert!(matches!(
            err.retry_error(),
            Some(RetryError::Exhausted { attempts: 2, .. })
        ));
    }
}
