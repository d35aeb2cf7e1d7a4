//! Strata core
//!
//! Declaration model, KDL loader and dependency graph. Nothing in this crate
//! talks to a provider; applying a [`Deployment`] is the job of
//! `strata-cloud`.

pub mod error;
pub mod graph;
pub mod model;
pub mod parser;

pub use error::{FlowError, Result};
pub use graph::DependencyGraph;
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
