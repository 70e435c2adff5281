//! Action registry: the validated set of actions and conditions for a workflow.

use std::collections::HashSet;

use crate::core::action::Action;
use crate::core::condition::{Condition, ConditionSet};
use crate::core::error::RegistryError;

/// A validated workflow: unique names, known conditions, exactly one goal.
#[derive(Debug)]
pub struct ActionRegistry<'a> {
    actions: Vec<Action<'a>>,
    conditions: ConditionSet<'a>,
    goal: usize,
}

impl<'a> ActionRegistry<'a> {
    pub fn builder() -> RegistryBuilder<'a> {
        RegistryBuilder::default()
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> &[Action<'a>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action<'a>> {
        self.actions.iter().find(|a| a.name() == name)
    }

    pub fn conditions(&self) -> &ConditionSet<'a> {
        &self.conditions
    }

    pub fn goal(&self) -> &Action<'a> {
        &self.actions[self.goal]
    }
}

/// Collects declarations; [`RegistryBuilder::build`] validates them.
#[derive(Debug, Default)]
pub struct RegistryBuilder<'a> {
    actions: Vec<Action<'a>>,
    conditions: Vec<Condition<'a>>,
}

impl<'a> RegistryBuilder<'a> {
    pub fn action(mut self, action: Action<'a>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn condition(mut self, condition: Condition<'a>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Validate declarations. Checks run in a fixed order and the first
    /// violation is returned:
    /// - non-empty action and condition names
    /// - unique action names, unique condition names
    /// - every pre/post condition is registered
    /// - exactly one goal action
    pub fn build(self) -> Result<ActionRegistry<'a>, RegistryError> {
        if self.actions.iter().any(|a| a.name().trim().is_empty()) {
            return Err(RegistryError::EmptyName { kind: "action" });
        }
        if self.conditions.iter().any(|c| c.name().trim().is_empty()) {
            return Err(RegistryError::EmptyName { kind: "condition" });
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name()) {
                return Err(RegistryError::DuplicateAction(action.name().to_string()));
            }
        }

        let mut condition_names = HashSet::new();
        for condition in &self.conditions {
            if !condition_names.insert(condition.name()) {
                return Err(RegistryError::DuplicateCondition(
                    condition.name().to_string(),
                ));
            }
        }

        for action in &self.actions {
            let referenced = action.pre().iter().chain(action.post());
            for condition in referenced {
                if !condition_names.contains(condition.as_str()) {
                    return Err(RegistryError::UnknownCondition {
                        action: action.name().to_string(),
                        condition: condition.clone(),
                    });
                }
            }
        }

        let goals: Vec<usize> = self
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_goal())
            .map(|(idx, _)| idx)
            .collect();
        let goal = match goals.as_slice() {
            [] => return Err(RegistryError::NoGoal),
            [only] => *only,
            many => {
                return Err(RegistryError::MultipleGoals(
                    many.iter()
                        .map(|idx| self.actions[*idx].name().to_string())
                        .collect(),
                ));
            }
        };

        Ok(ActionRegistry {
            actions: self.actions,
            conditions: ConditionSet::new(self.conditions),
            goal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Action<'static> {
        Action::builder(name).output_binding(name).run(|_| Ok(true))
    }

    fn goal(name: &str) -> Action<'static> {
        Action::builder(name)
            .output_binding(name)
            .goal()
            .run(|_| Ok(true))
    }

    #[test]
    fn builds_with_single_goal() {
        let registry = ActionRegistry::builder()
            .condition(Condition::present_named::<bool>("ready", "a"))
            .action(noop("a"))
            .action(
                Action::builder("b")
                    .pre("ready")
                    .goal()
                    .run(|_| Ok(true)),
            )
            .build()
            .expect("registry");
        assert_eq!(registry.goal().name(), "b");
        assert_eq!(registry.actions().len(), 2);
        assert!(registry.action("a").is_some());
        assert!(registry.conditions().contains("ready"));
    }

    #[test]
    fn rejects_missing_goal() {
        let err = ActionRegistry::builder()
            .action(noop("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::NoGoal);
    }

    #[test]
    fn rejects_two_goals() {
        let err = ActionRegistry::builder()
            .action(goal("first"))
            .action(noop("middle"))
            .action(goal("second"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::MultipleGoals(vec!["first".into(), "second".into()])
        );
    }

    #[test]
    fn rejects_duplicates_and_unknown_conditions() {
        let err = ActionRegistry::builder()
            .action(noop("a"))
            .action(noop("a"))
            .action(goal("g"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAction("a".into()));

        let err = ActionRegistry::builder()
            .condition(Condition::new("c", |_| true))
            .condition(Condition::new("c", |_| false))
            .action(goal("g"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateCondition("c".into()));

        let err = ActionRegistry::builder()
            .action(Action::builder("g").post("typo").goal().run(|_| Ok(true)))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownCondition {
                action: "g".into(),
                condition: "typo".into(),
            }
        );
    }

    #[test]
    fn rejects_blank_names() {
        let err = ActionRegistry::builder()
            .action(goal(" "))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyName { kind: "action" });
    }
}
