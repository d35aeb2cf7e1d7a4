//! `resource` node parsing

use super::value::parse_property_node;
use crate::error::{FlowError, Result};
use crate::model::{Resource, ResourceKind};
use kdl::KdlNode;

/// Parse `resource "<kind>" "<id>" { <property nodes> }`
pub fn parse_resource(node: &KdlNode) -> Result<Resource> {
    let mut args = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value().as_string());

    let kind = args.next().flatten().ok_or_else(|| {
        FlowError::InvalidConfig(
            "resource requires a kind, e.g. resource \"network\" \"vpc\"".to_string(),
        )
    })?;
    let id = args
        .next()
        .flatten()
        .ok_or_else(|| FlowError::InvalidConfig(format!("resource '{}' requires an id", kind)))?;

    if id.is_empty() || id.contains('.') {
        return Err(FlowError::InvalidConfig(format!(
            "invalid resource id '{}': ids must be non-empty and cannot contain '.'",
            id
        )));
    }

    let kind: ResourceKind = kind.to_string().into();
    let mut resource = Resource::new(kind, id);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let name = child.name().value();
            if resource.inputs.contains_key(name) {
                return Err(FlowError::InvalidConfig(format!(
                    "resource '{}': input '{}' is set more than once",
                    id, name
                )));
            }
            resource.set_input(name, parse_property_node(child)?);
        }
    }

    Ok(resource)
}
