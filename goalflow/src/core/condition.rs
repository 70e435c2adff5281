//! Named boolean predicates over the state store.
//!
//! Conditions gate actions (preconditions) and check their effects
//! (postconditions). They are pure: a condition reading an absent binding is
//! simply `false`, never an error.

use std::fmt;

use tracing::debug;

use crate::core::state::{BindingType, StateStore};

type Predicate<'a> = Box<dyn Fn(&StateStore) -> bool + 'a>;

/// A named predicate over the state store.
pub struct Condition<'a> {
    name: String,
    predicate: Predicate<'a>,
}

impl<'a> Condition<'a> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&StateStore) -> bool + 'a) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// True once a value of type `T` resolves under its canonical rules.
    pub fn present<T: BindingType>(name: impl Into<String>) -> Self {
        Self::new(name, |state| state.try_get::<T>(None).is_some())
    }

    /// True once the named binding holds a decodable `T`.
    pub fn present_named<T: BindingType>(
        name: impl Into<String>,
        binding: impl Into<String>,
    ) -> Self {
        let binding = binding.into();
        Self::new(name, move |state| {
            state.try_get::<T>(Some(binding.as_str())).is_some()
        })
    }

    /// True when the binding resolves and `pred` holds for its value.
    pub fn matches<T: BindingType>(
        name: impl Into<String>,
        binding: Option<&str>,
        pred: impl Fn(&T) -> bool + 'a,
    ) -> Self {
        let binding = binding.map(str::to_string);
        Self::new(name, move |state| {
            state
                .try_get::<T>(binding.as_deref())
                .is_some_and(|value| pred(&value))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, state: &StateStore) -> bool {
        (self.predicate)(state)
    }
}

impl fmt::Debug for Condition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Conditions registered for one workflow, kept in declaration order.
#[derive(Debug, Default)]
pub struct ConditionSet<'a> {
    conditions: Vec<Condition<'a>>,
}

impl<'a> ConditionSet<'a> {
    pub fn new(conditions: Vec<Condition<'a>>) -> Self {
        Self { conditions }
    }

    pub fn get(&self, name: &str) -> Option<&Condition<'a>> {
        self.conditions.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition<'a>> {
        self.conditions.iter()
    }

    /// Evaluate the named condition. Unknown names evaluate to `false`.
    pub fn evaluate(&self, name: &str, state: &StateStore) -> bool {
        let result = match self.get(name) {
            Some(condition) => condition.evaluate(state),
            None => false,
        };
        debug!(condition = name, result, "evaluated condition");
        result
    }

    /// Names from `names` that do not currently hold.
    pub fn unmet<'n>(&self, names: &'n [String], state: &StateStore) -> Vec<&'n str> {
        names
            .iter()
            .filter(|name| !self.evaluate(name, state))
            .map(String::as_str)
            .collect()
    }
}
