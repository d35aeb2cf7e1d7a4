//! `output` node parsing

use super::value::{parse_arguments, parse_property_node};
use crate::error::{FlowError, Result};
use crate::model::Output;
use kdl::{KdlEntry, KdlNode};

/// Parse an output in one of two forms:
///
/// ```kdl
/// output "db_endpoint" (ref)"login-db.endpoint"
/// output "db_url" {
///     description "connection string"
///     (concat)value "postgres://" (ref)"login-db.endpoint"
/// }
/// ```
pub fn parse_output(node: &KdlNode) -> Result<Output> {
    let args: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_none()).collect();

    let name = args
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| FlowError::InvalidConfig("output requires a name".to_string()))?
        .to_string();

    let inline = &args[1..];
    let children = node.children().map(|c| c.nodes()).unwrap_or_default();

    if !inline.is_empty() {
        if !children.is_empty() {
            return Err(FlowError::InvalidConfig(format!(
                "output '{}': give the value inline or in a block, not both",
                name
            )));
        }
        return Ok(Output::new(name, parse_arguments(inline)?));
    }

    let mut value = None;
    let mut description = None;
    for child in children {
        match child.name().value() {
            "value" => value = Some(parse_property_node(child)?),
            "description" => {
                description = child
                    .entries()
                    .first()
                    .and_then(|e| e.value().as_string())
                    .map(|s| s.to_string());
            }
            other => {
                return Err(FlowError::InvalidConfig(format!(
                    "output '{}': unknown field '{}'",
                    name, other
                )));
            }
        }
    }

    let value = value
        .ok_or_else(|| FlowError::InvalidConfig(format!("output '{}' has no value", name)))?;
    let mut output = Output::new(name, value);
    output.description = description;
    Ok(output)
}
