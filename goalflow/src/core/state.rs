//! Typed binding store threaded between actions.
//!
//! Values are held as JSON tagged with a type name, so the whole store can be
//! snapshotted for run journals while actions still read and write plain Rust
//! types through [`BindingType`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::LookupError;

/// A Rust type that can be stored in a [`StateStore`].
///
/// `TYPE_NAME` identifies the type inside the store and doubles as the
/// canonical binding name when an action does not name its binding.
pub trait BindingType: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;
}

impl BindingType for String {
    const TYPE_NAME: &'static str = "string";
}

impl BindingType for bool {
    const TYPE_NAME: &'static str = "bool";
}

/// A named, typed value held in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub type_name: String,
    pub value: Value,
    /// Store revision at which this binding was last written.
    pub revision: u64,
}

impl Binding {
    /// Decode the value as `T`, checking the type tag first.
    pub fn decode<T: BindingType>(&self) -> Result<T, LookupError> {
        if self.type_name != T::TYPE_NAME {
            return Err(LookupError::TypeMismatch {
                name: self.name.clone(),
                expected: T::TYPE_NAME.to_string(),
                found: self.type_name.clone(),
            });
        }
        serde_json::from_value(self.value.clone()).map_err(|err| LookupError::Decode {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            message: err.to_string(),
        })
    }
}

/// Mutable mapping from binding name to typed value, owned by a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    bindings: BTreeMap<String, Binding>,
    revision: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current store revision (number of writes so far).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Bindings ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Write `value` under `name`, replacing any earlier binding with that name.
    ///
    /// Returns the revision stamped on the binding.
    pub fn insert<T: BindingType>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<u64, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert_value(name, T::TYPE_NAME, value))
    }

    /// Write `value` under its canonical binding name.
    pub fn insert_default<T: BindingType>(&mut self, value: &T) -> Result<u64, serde_json::Error> {
        self.insert(T::TYPE_NAME, value)
    }

    /// Write an already-encoded value.
    pub fn insert_value(
        &mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: Value,
    ) -> u64 {
        self.revision += 1;
        let name = name.into();
        self.bindings.insert(
            name.clone(),
            Binding {
                name,
                type_name: type_name.into(),
                value,
                revision: self.revision,
            },
        );
        self.revision
    }

    /// Resolve a binding by type, optionally disambiguated by name.
    ///
    /// - With a name: the binding must exist and carry `type_name`.
    /// - Without a name: the binding named after the type wins; otherwise the
    ///   type must be held by exactly one binding.
    pub fn resolve(&self, type_name: &str, name: Option<&str>) -> Result<&Binding, LookupError> {
        if let Some(name) = name {
            let binding = self.bindings.get(name).ok_or_else(|| LookupError::Absent {
                type_name: type_name.to_string(),
                name: Some(name.to_string()),
            })?;
            if binding.type_name != type_name {
                return Err(LookupError::TypeMismatch {
                    name: name.to_string(),
                    expected: type_name.to_string(),
                    found: binding.type_name.clone(),
                });
            }
            return Ok(binding);
        }

        if let Some(binding) = self.bindings.get(type_name)
            && binding.type_name == type_name
        {
            return Ok(binding);
        }

        let mut candidates = self.bindings.values().filter(|b| b.type_name == type_name);
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Ok(only),
            (None, _) => Err(LookupError::Absent {
                type_name: type_name.to_string(),
                name: None,
            }),
            (Some(first), Some(second)) => {
                let mut names = vec![first.name.clone(), second.name.clone()];
                names.extend(candidates.map(|b| b.name.clone()));
                Err(LookupError::Ambiguous {
                    type_name: type_name.to_string(),
                    candidates: names,
                })
            }
        }
    }

    /// Resolve and decode a typed value.
    pub fn get<T: BindingType>(&self, name: Option<&str>) -> Result<T, LookupError> {
        self.resolve(T::TYPE_NAME, name)?.decode()
    }

    /// Like [`StateStore::get`], but treats every lookup failure as "not yet known".
    pub fn try_get<T: BindingType>(&self, name: Option<&str>) -> Option<T> {
        self.get(name).ok()
    }
}
