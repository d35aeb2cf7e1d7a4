//! Strata Cloud
//!
//! Applies a [`strata_core::Deployment`] through pluggable resource
//! providers, in dependency order and with bounded concurrency, and keeps
//! the record of what was applied.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   strata CLI                     │
//! │            (plan / up / down / outputs)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 strata-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Session: plan, apply, destroy, outputs  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Providers   │  │    State     │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ strata-cloud- │ │ .strata/      │
//! │ local         │ │ state.json    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
mod apply;
mod destroy;
pub mod error;
pub mod export;
mod plan;
pub mod provider;
pub mod report;
pub mod session;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use error::{CloudError, ProviderError, ProviderResult, Result};
pub use export::{OutputEntry, OutputReport, OutputValue, export_outputs};
pub use provider::{ProviderRegistry, ResourceContext, ResourceProvider, RetryConfig};
pub use report::{ApplyReport, ApplySummary, DestroyReport, ResourceReport, ResourceStatus};
pub use session::Session;
pub use state::{
    FileStateStore, GlobalState, MemoryStateStore, StateLock, StateManager, StateRecord, StateStore,
};
