//! Property values
//!
//! Resource inputs and output declarations are trees of [`Value`]. A
//! [`Reference`] anywhere in the tree points at an output of another resource
//! and is what the dependency graph is derived from.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resolved property bag, as handed to providers and stored in state.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Pointer to `resource.output`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Id of the referenced resource
    pub resource: String,

    /// Output property of the referenced resource
    pub output: String,
}

impl Reference {
    pub fn new(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            output: output.into(),
        }
    }

    /// Parse the textual `resource.output` form.
    ///
    /// The split happens at the first `.`, so output names may contain dots
    /// but resource ids may not.
    pub fn parse(text: &str) -> Result<Self> {
        match text.split_once('.') {
            Some((resource, output)) if !resource.is_empty() && !output.is_empty() => {
                Ok(Self::new(resource, output))
            }
            _ => Err(FlowError::InvalidReference(text.to_string())),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.output)
    }
}

/// A declared property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Output of another resource
    Ref(Reference),
    /// Parts resolved, stringified and joined
    Concat(Vec<Value>),
}

impl Value {
    pub fn reference(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Value::Ref(Reference::new(resource, output))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn concat(parts: impl IntoIterator<Item = Value>) -> Self {
        Value::Concat(parts.into_iter().collect())
    }

    /// Call `visit` for every reference in this value, depth first.
    pub fn visit_references<'a>(&'a self, visit: &mut dyn FnMut(&'a Reference)) {
        match self {
            Value::Ref(reference) => visit(reference),
            Value::List(items) | Value::Concat(items) => {
                for item in items {
                    item.visit_references(visit);
                }
            }
            Value::Map(entries) => {
                for value in entries.values() {
                    value.visit_references(visit);
                }
            }
            Value::Null
            | Value::Bool(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::String(_) => {}
        }
    }

    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        self.visit_references(&mut |r| found.push(r));
        found
    }

    /// Whether the value contains no references.
    pub fn is_literal(&self) -> bool {
        self.references().is_empty()
    }

    /// Substitute every reference through `lookup`.
    ///
    /// Returns the first reference `lookup` could not answer.
    pub fn resolve<F>(&self, lookup: &F) -> std::result::Result<serde_json::Value, Reference>
    where
        F: Fn(&Reference) -> Option<serde_json::Value>,
    {
        use serde_json::Value as Json;

        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| item.resolve(lookup))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, value) in entries {
                    object.insert(key.clone(), value.resolve(lookup)?);
                }
                Json::Object(object)
            }
            Value::Ref(reference) => lookup(reference).ok_or_else(|| reference.clone())?,
            Value::Concat(parts) => {
                let mut joined = String::new();
                for part in parts {
                    joined.push_str(&stringify(&part.resolve(lookup)?));
                }
                Json::String(joined)
            }
        })
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Value::Ref(value)
    }
}
