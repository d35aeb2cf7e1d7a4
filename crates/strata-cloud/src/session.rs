//! Entry point for planning, applying and destroying a deployment

use crate::error::Result;
use crate::export::{OutputReport, export_outputs};
use crate::provider::{ProviderRegistry, RetryConfig};
use crate::state::{StateRecord, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{DependencyGraph, Deployment, EngineSettings};
use tokio_util::sync::CancellationToken;

/// Providers, state and run settings shared by every operation
///
/// A session does not hold a deployment; each call takes the deployment it
/// acts on, so the same session can plan and then apply.
pub struct Session {
    pub(crate) providers: ProviderRegistry,
    pub(crate) state: Arc<dyn StateStore>,
    pub(crate) settings: EngineSettings,
    pub(crate) retry: RetryConfig,
    pub(crate) cancel: CancellationToken,
}

impl Session {
    pub fn new(providers: ProviderRegistry, state: Arc<dyn StateStore>) -> Self {
        Self {
            providers,
            state,
            settings: EngineSettings::default(),
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    /// Token that cancels the current and any later run of this session.
    ///
    /// A cancelled run dispatches nothing new; calls already in flight
    /// finish and their results are recorded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Outputs of `deployment` as recorded by previous applies
    pub async fn outputs(&self, deployment: &Deployment) -> Result<OutputReport> {
        DependencyGraph::build(deployment)?;
        let records = self.records_by_id().await?;

        Ok(export_outputs(deployment.outputs(), |id| {
            records
                .get(id)
                .map(|r| &r.outputs)
                .ok_or_else(|| format!("resource '{id}' has not been applied"))
        }))
    }

    pub(crate) async fn records_by_id(&self) -> Result<HashMap<String, StateRecord>> {
        Ok(self
            .state
            .list()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("providers", &self.providers)
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
