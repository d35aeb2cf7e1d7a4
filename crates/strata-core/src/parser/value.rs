//! Property node parsing
//!
//! Maps KDL nodes onto [`Value`] trees:
//!
//! - one argument is a scalar, several are a list
//! - `(ref)"resource.output"` is a reference
//! - a `(concat)` node joins its arguments
//! - children named `-` are list items, other children and `key=value`
//!   properties form a map
//! - a node with neither arguments nor children is null

use crate::error::{FlowError, Result};
use crate::model::{Reference, Value};
use kdl::{KdlEntry, KdlNode, KdlValue};
use std::collections::BTreeMap;

const LIST_ITEM: &str = "-";

/// Parse the value carried by a property node.
pub fn parse_property_node(node: &KdlNode) -> Result<Value> {
    let name = node.name().value();
    let (args, props): (Vec<&KdlEntry>, Vec<&KdlEntry>) =
        node.entries().iter().partition(|e| e.name().is_none());

    if node.ty().map(|t| t.value()) == Some("concat") {
        if !props.is_empty() || node.children().is_some() {
            return Err(FlowError::InvalidConfig(format!(
                "'{}': a concat value takes only arguments",
                name
            )));
        }
        let parts = args
            .iter()
            .map(|e| parse_entry(e))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Concat(parts));
    }

    let children = node.children().map(|c| c.nodes()).unwrap_or_default();

    if !args.is_empty() {
        if !children.is_empty() || !props.is_empty() {
            return Err(FlowError::InvalidConfig(format!(
                "'{}': arguments cannot be mixed with properties or children",
                name
            )));
        }
        return parse_arguments(&args);
    }

    if !children.is_empty() && children.iter().all(|c| c.name().value() == LIST_ITEM) {
        if !props.is_empty() {
            return Err(FlowError::InvalidConfig(format!(
                "'{}': list items cannot be mixed with properties",
                name
            )));
        }
        let items = children
            .iter()
            .map(parse_property_node)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::List(items));
    }

    if children.is_empty() && props.is_empty() {
        return Ok(Value::Null);
    }

    let mut map = BTreeMap::new();
    for prop in props {
        if let Some(key) = prop.name() {
            map.insert(key.value().to_string(), parse_entry(prop)?);
        }
    }
    for child in children {
        let key = child.name().value();
        if key == LIST_ITEM {
            return Err(FlowError::InvalidConfig(format!(
                "'{}': list items cannot be mixed with named children",
                name
            )));
        }
        if map
            .insert(key.to_string(), parse_property_node(child)?)
            .is_some()
        {
            return Err(FlowError::InvalidConfig(format!(
                "'{}': key '{}' is set more than once",
                name, key
            )));
        }
    }
    Ok(Value::Map(map))
}

/// Parse node arguments: one argument is a scalar, several are a list.
pub fn parse_arguments(args: &[&KdlEntry]) -> Result<Value> {
    match args {
        [] => Ok(Value::Null),
        [single] => parse_entry(single),
        many => Ok(Value::List(
            many.iter()
                .map(|e| parse_entry(e))
                .collect::<Result<Vec<_>>>()?,
        )),
    }
}

/// Parse one entry, honouring a `(ref)` type annotation.
pub fn parse_entry(entry: &KdlEntry) -> Result<Value> {
    match entry.ty().map(|t| t.value()) {
        Some("ref") => {
            let text = entry.value().as_string().ok_or_else(|| {
                FlowError::InvalidConfig("a (ref) value must be a string".to_string())
            })?;
            Ok(Value::Ref(Reference::parse(text)?))
        }
        Some(other) => Err(FlowError::InvalidConfig(format!(
            "unknown value annotation '({})'",
            other
        ))),
        None => convert_value(entry.value()),
    }
}

fn convert_value(value: &KdlValue) -> Result<Value> {
    if let Some(s) = value.as_string() {
        Ok(Value::String(s.to_string()))
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::Integer)
            .map_err(|_| FlowError::InvalidConfig(format!("integer {} is out of range", i)))
    } else if let Some(f) = value.as_float() {
        Ok(Value::Float(f))
    } else if let Some(b) = value.as_bool() {
        Ok(Value::Bool(b))
    } else {
        Ok(Value::Null)
    }
}
