//! Deployment registry

use super::output::Output;
use super::resource::Resource;
use super::settings::EngineSettings;
use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every declaration of one stack
///
/// Resources keep their declaration order, which is the tie-break of the
/// topological order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,

    resources: Vec<Resource>,

    outputs: Vec<Output>,

    pub settings: EngineSettings,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a resource declaration. Ids must be unique.
    pub fn register(&mut self, resource: Resource) -> Result<()> {
        if self.index.contains_key(&resource.id) {
            return Err(FlowError::DuplicateResource(resource.id));
        }
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    /// Builder-style [`Deployment::register`].
    pub fn with_resource(mut self, resource: Resource) -> Result<Self> {
        self.register(resource)?;
        Ok(self)
    }

    /// Declare a named output. Names must be unique.
    pub fn export(&mut self, output: Output) -> Result<()> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(FlowError::DuplicateOutput(output.name));
        }
        self.outputs.push(output);
        Ok(())
    }

    pub fn with_output(mut self, output: Output) -> Result<Self> {
        self.export(output)?;
        Ok(self)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.position(id).map(|i| &self.resources[i])
    }

    /// Declaration index of a resource.
    pub fn position(&self, id: &str) -> Option<usize> {
        if self.index.len() == self.resources.len() {
            self.index.get(id).copied()
        } else {
            // Deserialized without the index
            self.resources.iter().position(|r| r.id == id)
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, Value};

    #[test]
    fn test_register_keeps_declaration_order() {
        let mut deployment = Deployment::new("login");
        deployment
            .register(Resource::new(ResourceKind::Network, "vpc"))
            .unwrap();
        deployment
            .register(Resource::new(ResourceKind::Subnet, "subnet"))
            .unwrap();

        assert_eq!(deployment.position("vpc"), Some(0));
        assert_eq!(deployment.position("subnet"), Some(1));
        assert!(deployment.get("db").is_none());
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let mut deployment = Deployment::new("login");
        deployment
            .register(Resource::new(ResourceKind::Network, "vpc"))
            .unwrap();

        let err = deployment
            .register(Resource::new(ResourceKind::Subnet, "vpc"))
            .unwrap_err();
        assert!(matches!(err, FlowError::DuplicateResource(id) if id == "vpc"));
        assert_eq!(deployment.len(), 1);
    }

    #[test]
    fn test_duplicate_output_is_rejected() {
        let mut deployment = Deployment::new("login");
        deployment
            .export(Output::new("endpoint", Value::reference("db", "endpoint")))
            .unwrap();
        let err = deployment
            .export(Output::new("endpoint", Value::from("x")))
            .unwrap_err();
        assert!(matches!(err, FlowError::DuplicateOutput(_)));
    }
}
