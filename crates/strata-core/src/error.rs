use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid reference '{0}': expected <resource>.<output>")]
    InvalidReference(String),

    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("output '{0}' is declared more than once")]
    DuplicateOutput(String),

    #[error("{from} references '{reference}', but no resource '{missing}' is declared")]
    MissingReference {
        from: String,
        reference: String,
        missing: String,
    },

    #[error("dependency cycle detected: {}", format_cycle(.members))]
    CircularDependency { members: Vec<String> },
}

impl FlowError {
    /// Ids taking part in a dependency cycle, if this is a cycle error.
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            FlowError::CircularDependency { members } => Some(members),
            _ => None,
        }
    }

    /// The undeclared resource id, if this is a missing-reference error.
    pub fn missing_resource(&self) -> Option<&str> {
        match self {
            FlowError::MissingReference { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
