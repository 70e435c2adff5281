//! Side-effecting collaborators: config, child processes, model calls,
//! operator input, and output files.

pub mod command;
pub mod config;
pub mod critic;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod sink;
pub mod terminal;
