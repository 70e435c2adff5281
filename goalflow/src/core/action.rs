//! Action records: declared inputs, gating conditions, and a typed body.

use std::fmt;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::state::{Binding, BindingType};

/// One input requirement, resolved from the store by type and optional name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub type_name: &'static str,
    pub binding: Option<String>,
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(name) => write!(f, "{}:{}", name, self.type_name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Where an action's result is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub binding: String,
    pub type_name: &'static str,
}

type ActionFn<'a> = Box<dyn Fn(&Inputs<'_>) -> Result<Value> + 'a>;

/// A unit of orchestrated work.
pub struct Action<'a> {
    name: String,
    inputs: Vec<InputSpec>,
    pre: Vec<String>,
    post: Vec<String>,
    output: OutputSpec,
    goal: bool,
    rerunnable: bool,
    body: ActionFn<'a>,
}

impl<'a> Action<'a> {
    pub fn builder(name: impl Into<String>) -> ActionBuilder {
        ActionBuilder {
            name: name.into(),
            inputs: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            output_binding: None,
            goal: false,
            rerunnable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn pre(&self) -> &[String] {
        &self.pre
    }

    pub fn post(&self) -> &[String] {
        &self.post
    }

    pub fn output(&self) -> &OutputSpec {
        &self.output
    }

    pub fn is_goal(&self) -> bool {
        self.goal
    }

    pub fn is_rerunnable(&self) -> bool {
        self.rerunnable
    }

    /// Run the body against resolved inputs. The result is not yet committed.
    pub fn execute(&self, inputs: &Inputs<'_>) -> Result<Value> {
        (self.body)(inputs)
    }
}

impl fmt::Debug for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("output", &self.output)
            .field("goal", &self.goal)
            .field("rerunnable", &self.rerunnable)
            .finish_non_exhaustive()
    }
}

/// Declarative builder; [`ActionBuilder::run`] fixes the output type and
/// produces the [`Action`].
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    name: String,
    inputs: Vec<InputSpec>,
    pre: Vec<String>,
    post: Vec<String>,
    output_binding: Option<String>,
    goal: bool,
    rerunnable: bool,
}

impl ActionBuilder {
    /// Require a `T`, resolved by type.
    pub fn input<T: BindingType>(mut self) -> Self {
        self.inputs.push(InputSpec {
            type_name: T::TYPE_NAME,
            binding: None,
        });
        self
    }

    /// Require a `T` held under a specific binding name.
    pub fn input_named<T: BindingType>(mut self, binding: impl Into<String>) -> Self {
        self.inputs.push(InputSpec {
            type_name: T::TYPE_NAME,
            binding: Some(binding.into()),
        });
        self
    }

    pub fn pre(mut self, condition: impl Into<String>) -> Self {
        self.pre.push(condition.into());
        self
    }

    pub fn post(mut self, condition: impl Into<String>) -> Self {
        self.post.push(condition.into());
        self
    }

    /// Override the output binding name (defaults to the output type's name).
    pub fn output_binding(mut self, binding: impl Into<String>) -> Self {
        self.output_binding = Some(binding.into());
        self
    }

    pub fn goal(mut self) -> Self {
        self.goal = true;
        self
    }

    pub fn rerunnable(mut self) -> Self {
        self.rerunnable = true;
        self
    }

    pub fn run<'a, T, F>(self, body: F) -> Action<'a>
    where
        T: BindingType,
        F: Fn(&Inputs<'_>) -> Result<T> + 'a,
    {
        let output = OutputSpec {
            binding: self
                .output_binding
                .unwrap_or_else(|| T::TYPE_NAME.to_string()),
            type_name: T::TYPE_NAME,
        };
        Action {
            name: self.name,
            inputs: self.inputs,
            pre: self.pre,
            post: self.post,
            output,
            goal: self.goal,
            rerunnable: self.rerunnable,
            body: Box::new(move |inputs: &Inputs<'_>| {
                let value = body(inputs)?;
                Ok(serde_json::to_value(&value)?)
            }),
        }
    }
}

/// Bindings resolved for one execution, in declaration order.
#[derive(Debug, Clone)]
pub struct Inputs<'s> {
    resolved: Vec<(&'s InputSpec, &'s Binding)>,
}

impl<'s> Inputs<'s> {
    pub(crate) fn new(resolved: Vec<(&'s InputSpec, &'s Binding)>) -> Self {
        Self { resolved }
    }

    /// The first declared input of type `T`.
    pub fn get<T: BindingType>(&self) -> Result<T> {
        let (_, binding) = self
            .resolved
            .iter()
            .find(|(spec, _)| spec.type_name == T::TYPE_NAME)
            .ok_or_else(|| anyhow!("no declared input of type '{}'", T::TYPE_NAME))?;
        Ok(binding.decode::<T>()?)
    }

    /// The declared input bound under `binding`.
    pub fn named<T: BindingType>(&self, binding: &str) -> Result<T> {
        let (_, found) = self
            .resolved
            .iter()
            .find(|(_, b)| b.name == binding)
            .ok_or_else(|| anyhow!("no declared input bound as '{binding}'"))?;
        Ok(found.decode::<T>()?)
    }

    /// Resolved bindings as `(name, revision)` pairs.
    pub fn revisions(&self) -> Vec<(String, u64)> {
        self.resolved
            .iter()
            .map(|(_, b)| (b.name.clone(), b.revision))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StateStore;

    #[test]
    fn builder_defaults_output_binding_to_type_name() {
        let action = Action::builder("echo")
            .input_named::<String>("question")
            .pre("asked")
            .post("answered")
            .run(|inputs| inputs.named::<String>("question"));

        assert_eq!(action.name(), "echo");
        assert_eq!(action.output().binding, "string");
        assert_eq!(action.output().type_name, "string");
        assert_eq!(action.pre(), ["asked".to_string()]);
        assert_eq!(action.post(), ["answered".to_string()]);
        assert!(!action.is_goal());
        assert!(!action.is_rerunnable());
    }

    #[test]
    fn execute_encodes_typed_result() {
        let action = Action::builder("shout")
            .input::<String>()
            .output_binding("loud")
            .goal()
            .run(|inputs| Ok(inputs.get::<String>()?.to_uppercase()));

        let mut state = StateStore::new();
        state.insert("string", &"hi".to_string()).expect("insert");
        let binding = state.binding("string").expect("binding");
        let inputs = Inputs::new(vec![(&action.inputs()[0], binding)]);

        let value = action.execute(&inputs).expect("execute");
        assert_eq!(value, serde_json::json!("HI"));
        assert_eq!(action.output().binding, "loud");
        assert!(action.is_goal());
    }

    #[test]
    fn undeclared_input_is_an_error() {
        let inputs = Inputs::new(Vec::new());
        let err = inputs.get::<String>().unwrap_err();
        assert!(err.to_string().contains("no declared input"));
        assert!(inputs.named::<bool>("flag").is_err());
    }
}
