//! Declaration model
//!
//! Resources, their property values, exported outputs and the deployment
//! registry that owns them.

mod deployment;
mod output;
mod resource;
mod settings;
mod value;

pub use deployment::*;
pub use output::*;
pub use resource::*;
pub use settings::*;
pub use value::*;
