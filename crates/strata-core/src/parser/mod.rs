//! KDL parser
//!
//! Loads stack declarations from KDL. Each top-level node type has its own
//! module; property values share [`value`].

mod output;
mod resource;
mod settings;
mod value;

pub use output::parse_output;
pub use resource::parse_resource;
pub use settings::parse_settings;
pub use value::{parse_entry, parse_property_node};

use crate::error::{FlowError, Result};
use crate::model::Deployment;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// Parse a stack file. The stack is named after the file stem unless a
/// `stack` node says otherwise.
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Deployment> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse stack declarations from a KDL string.
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Deployment> {
    let doc: KdlDocument = content.parse()?;
    let mut deployment = Deployment::new(default_name);

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if let Some(name) = node.entries().first().and_then(|e| e.value().as_string()) {
                    deployment.name = name.to_string();
                }
            }
            "settings" => {
                deployment.settings = parse_settings(node)?;
            }
            "resource" => {
                deployment.register(parse_resource(node)?)?;
            }
            "output" => {
                deployment.export(parse_output(node)?)?;
            }
            other => {
                return Err(FlowError::InvalidConfig(format!(
                    "unknown top-level node '{}' (expected stack, settings, resource or output)",
                    other
                )));
            }
        }
    }

    tracing::debug!(
        "Parsed stack '{}': {} resources, {} outputs",
        deployment.name,
        deployment.len(),
        deployment.outputs().len()
    );
    Ok(deployment)
}

#[cfg(test)]
mod tests;
