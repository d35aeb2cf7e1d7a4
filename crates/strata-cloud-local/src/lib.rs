//! Local provider for Strata
//!
//! Implements [`strata_cloud::ResourceProvider`] for every built-in
//! resource kind without talking to a cloud. Inputs are validated the way
//! the real service would validate them, and outputs (ids, ARNs, database
//! endpoints, cluster kubeconfigs) are derived deterministically from the
//! region and the resource id.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_cloud::{MemoryStateStore, ProviderRegistry, Session};
//! use strata_cloud_local::LocalProvider;
//!
//! let provider = Arc::new(LocalProvider::new("ap-south-1"));
//! let session = Session::new(
//!     ProviderRegistry::new().with_fallback(provider),
//!     Arc::new(MemoryStateStore::new()),
//! );
//! let report = session.apply(&deployment).await?;
//! ```

pub mod error;
pub mod kinds;
pub mod naming;
pub mod provider;

pub use error::{LocalError, Result};
pub use provider::{DEFAULT_ACCOUNT_ID, DEFAULT_REGION, LocalProvider};
