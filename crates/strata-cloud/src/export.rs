//! Stack outputs resolved against applied resources
//!
//! An output whose referenced resources did not all apply is reported as
//! unavailable together with the reason, never as a partial value.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use strata_core::{Output, Properties, Reference};

/// Value of one exported output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum OutputValue {
    Available {
        value: serde_json::Value,
    },
    Unavailable {
        reason: String,
        /// Referenced resources that were not usable
        resources: Vec<String>,
    },
}

impl OutputValue {
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            OutputValue::Available { value } => Some(value),
            OutputValue::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, OutputValue::Available { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub value: OutputValue,
}

/// Every declared output, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputReport {
    pub entries: Vec<OutputEntry>,
}

impl OutputReport {
    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    /// The value of `name`, or an error naming why it is missing
    pub fn require(&self, name: &str) -> Result<&serde_json::Value> {
        match self.get(name) {
            Some(OutputValue::Available { value }) => Ok(value),
            Some(OutputValue::Unavailable { reason, .. }) => Err(CloudError::UnavailableOutput {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(CloudError::UnavailableOutput {
                name: name.to_string(),
                reason: "no such output is declared".to_string(),
            }),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.value.is_available())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputEntry> {
        self.entries.iter()
    }

    /// JSON object of name to value. Unavailable outputs render as
    /// `{"unavailable": true, "reason": .., "resources": [..]}`.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|e| {
                let value = match &e.value {
                    OutputValue::Available { value } => value.clone(),
                    OutputValue::Unavailable { reason, resources } => serde_json::json!({
                        "unavailable": true,
                        "reason": reason,
                        "resources": resources,
                    }),
                };
                (e.name.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Resolve `outputs` using `lookup`, which returns a resource's outputs or
/// the reason they cannot be used.
pub fn export_outputs<'a, F>(outputs: &[Output], lookup: F) -> OutputReport
where
    F: Fn(&str) -> std::result::Result<&'a Properties, String>,
{
    let entries = outputs
        .iter()
        .map(|output| OutputEntry {
            name: output.name.clone(),
            description: output.description.clone(),
            value: export_one(output, &lookup),
        })
        .collect();
    OutputReport { entries }
}

fn export_one<'a, F>(output: &Output, lookup: &F) -> OutputValue
where
    F: Fn(&str) -> std::result::Result<&'a Properties, String>,
{
    let mut resources: Vec<String> = Vec::new();
    let mut reasons: Vec<String> = Vec::new();
    for reference in output.references() {
        if resources.contains(&reference.resource) {
            continue;
        }
        if let Err(reason) = lookup(&reference.resource) {
            resources.push(reference.resource.clone());
            reasons.push(reason);
        }
    }
    if !resources.is_empty() {
        return OutputValue::Unavailable {
            reason: reasons.join("; "),
            resources,
        };
    }

    let resolve = |reference: &Reference| {
        lookup(&reference.resource)
            .ok()
            .and_then(|props| props.get(&reference.output))
            .cloned()
    };
    match output.value.resolve(&resolve) {
        Ok(value) => OutputValue::Available { value },
        Err(missing) => OutputValue::Unavailable {
            reason: format!("resource '{}' has no output '{}'", missing.resource, missing.output),
            resources: vec![missing.resource],
        },
    }
}
