//! Goal-directed workflow orchestration.
//!
//! A workflow is a set of actions gated by named conditions over a typed
//! state store. A run repeatedly picks the first eligible action, executes it
//! and commits its output, until the single goal action has run.
//!
//! - **[`core`]**: pure, deterministic logic (state, conditions, actions,
//!   registry validation, next-action selection). No I/O.
//! - **[`feedback`]** and **[`gate`]**: the acceptance-retry loop and the
//!   human-input gate built on it, over injected collaborators.
//! - **[`run`]**: step-wise orchestration of one run.
//! - **[`io`]**: side-effecting collaborators (model commands, terminal,
//!   files), isolated so tests can swap in scripted fakes.
//! - **[`workflow`]**: the trading-advisor and execution-plan workflows.

pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod feedback;
pub mod gate;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
