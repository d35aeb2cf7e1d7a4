//! Exported output declarations

use super::value::{Reference, Value};
use serde::{Deserialize, Serialize};

/// Named value published after apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,

    /// Literal, reference or composed value
    pub value: Value,

    pub description: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn references(&self) -> Vec<&Reference> {
        self.value.references()
    }
}
