//! Stable exit codes for goalflow CLI commands.

use crate::core::error::FlowError;

/// Command succeeded; for `run`, the goal action executed.
pub const OK: i32 = 0;
/// Invalid config or workflow, or any failure without a dedicated code.
pub const INVALID: i32 = 1;
/// No action could run before the goal was reached.
pub const STUCK: i32 = 3;
/// An acceptance-retry loop ran out of attempts.
pub const EXHAUSTED: i32 = 4;
/// The goal output was produced but could not be persisted.
pub const PERSIST_FAILED: i32 = 5;

/// Exit code for a failed run.
pub fn for_flow_error(err: &FlowError) -> i32 {
    match err {
        FlowError::PlanningStuck(_) => STUCK,
        FlowError::RetryExhausted { .. } => EXHAUSTED,
        FlowError::Persistence { .. } => PERSIST_FAILED,
        _ => INVALID,
    }
}
