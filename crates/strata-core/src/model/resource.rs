//! Resource declarations

use super::value::{Properties, Reference, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind tag of a declared resource
///
/// Selects the provider that handles the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Network,
    Subnet,
    SecurityGroup,
    SubnetGroup,
    Database,
    Cluster,
    Role,
    PolicyAttachment,
    FargateProfile,
    Custom(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::SubnetGroup => "subnet-group",
            ResourceKind::Database => "database",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Role => "role",
            ResourceKind::PolicyAttachment => "policy-attachment",
            ResourceKind::FargateProfile => "fargate-profile",
            ResourceKind::Custom(name) => name,
        }
    }
}

impl FromStr for ResourceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "network" | "vpc" => ResourceKind::Network,
            "subnet" => ResourceKind::Subnet,
            "security-group" | "security_group" | "security-rule" => ResourceKind::SecurityGroup,
            "subnet-group" | "subnet_group" => ResourceKind::SubnetGroup,
            "database" | "db" => ResourceKind::Database,
            "cluster" => ResourceKind::Cluster,
            "role" => ResourceKind::Role,
            "policy-attachment" | "policy_attachment" => ResourceKind::PolicyAttachment,
            "fargate-profile" | "fargate_profile" => ResourceKind::FargateProfile,
            other => ResourceKind::Custom(other.to_string()),
        })
    }
}

impl From<String> for ResourceKind {
    fn from(value: String) -> Self {
        match value.parse::<ResourceKind>() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<ResourceKind> for String {
    fn from(value: ResourceKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of one cloud object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique within a deployment
    pub id: String,

    pub kind: ResourceKind,

    /// Input properties, possibly containing references
    pub inputs: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.inputs.insert(name.into(), value.into());
    }

    /// Every reference in every input, in input-name order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        for value in self.inputs.values() {
            value.visit_references(&mut |r| found.push(r));
        }
        found
    }

    /// Ids of the resources this one depends on.
    pub fn dependency_ids(&self) -> BTreeSet<&str> {
        self.references()
            .into_iter()
            .map(|r| r.resource.as_str())
            .collect()
    }

    /// Resolve every input, or return the first reference `lookup` cannot
    /// satisfy.
    pub fn resolve_inputs<F>(&self, lookup: &F) -> std::result::Result<Properties, Reference>
    where
        F: Fn(&Reference) -> Option<serde_json::Value>,
    {
        self.inputs
            .iter()
            .map(|(name, value)| value.resolve(lookup).map(|v| (name.clone(), v)))
            .collect()
    }
}
