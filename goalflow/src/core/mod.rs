//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod condition;
pub mod critique;
pub mod error;
pub mod planner;
pub mod registry;
pub mod state;
