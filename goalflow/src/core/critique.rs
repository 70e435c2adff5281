//! Validator verdicts.

use serde::{Deserialize, Serialize};

use crate::core::state::BindingType;

/// Accept/reject verdict over a `(request, response)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub accepted: bool,
    pub reasoning: String,
}

impl Critique {
    pub fn accept(reasoning: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reasoning: reasoning.into(),
        }
    }

    pub fn reject(reasoning: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reasoning: reasoning.into(),
        }
    }
}

impl BindingType for Critique {
    const TYPE_NAME: &'static str = "critique";
}
