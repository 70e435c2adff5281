//! Concrete workflows assembled from the core.

pub mod execution;
pub mod trading;
