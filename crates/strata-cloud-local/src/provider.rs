//! Local provider implementation

use crate::error::{LocalError, Result};
use crate::kinds;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_cloud::{ProviderResult, ResourceContext, ResourceProvider};
use strata_core::Properties;

pub const DEFAULT_REGION: &str = "ap-south-1";
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Clone)]
struct Injected {
    message: String,
    /// `None` fails every call
    remaining: Option<u32>,
}

/// Simulated provider for every built-in resource kind
///
/// Nothing leaves the process: creating an object validates its inputs and
/// answers with the outputs the real service would report. Ids, ARNs and
/// endpoints are derived from the region and the resource id, so repeated
/// runs agree with each other.
pub struct LocalProvider {
    region: String,
    account_id: String,
    latency: Duration,
    failures: Mutex<HashMap<String, Injected>>,
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl LocalProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            latency: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    /// Sleep this long in every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure(self, id: impl Into<String>, message: impl Into<String>) -> Self {
        self.inject_failure(id, message);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Fail every call for `id` with a permanent error
    pub fn inject_failure(&self, id: impl Into<String>, message: impl Into<String>) {
        self.set_failure(
            id.into(),
            Injected {
                message: message.into(),
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls for `id` with a retryable error
    pub fn inject_outage(&self, id: impl Into<String>, times: u32) {
        let id = id.into();
        let message = format!("'{id}' is temporarily unavailable");
        self.set_failure(
            id,
            Injected {
                message,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.failures().clear();
    }

    /// Injected failures stay in force even if a holder of the lock panicked
    fn failures(&self) -> MutexGuard<'_, HashMap<String, Injected>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_failure(&self, id: String, failure: Injected) {
        self.failures().insert(id, failure);
    }

    fn injected(&self, id: &str) -> Result<()> {
        let mut failures = self.failures();
        let Some(failure) = failures.get_mut(id) else {
            return Ok(());
        };

        match failure.remaining {
            None => Err(LocalError::Injected(failure.message.clone())),
            Some(0) => {
                failures.remove(id);
                Ok(())
            }
            Some(left) => {
                failure.remaining = Some(left - 1);
                Err(LocalError::Unavailable(failure.message.clone()))
            }
        }
    }

    async fn simulate(&self, resource: &ResourceContext) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.injected(&resource.id)
    }
}

#[async_trait]
impl ResourceProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(
        &self,
        resource: &ResourceContext,
        inputs: &Properties,
    ) -> ProviderResult<Properties> {
        tracing::debug!(id = %resource.id, kind = %resource.kind, "Creating");
        kinds::validate(resource, inputs)?;
        self.simulate(resource).await?;

        let outputs = kinds::outputs(resource, inputs, &self.region, &self.account_id);
        tracing::info!("Created {} '{}'", resource.kind, resource.id);
        Ok(outputs)
    }

    async fn update(
        &self,
        resource: &ResourceContext,
        previous_inputs: &Properties,
        _previous_outputs: &Properties,
        inputs: &Properties,
    ) -> ProviderResult<Properties> {
        tracing::debug!(id = %resource.id, kind = %resource.kind, "Updating");
        kinds::validate(resource, inputs)?;
        kinds::check_immutable(&resource.kind, previous_inputs, inputs)?;
        self.simulate(resource).await?;

        let outputs = kinds::outputs(resource, inputs, &self.region, &self.account_id);
        tracing::info!("Updated {} '{}'", resource.kind, resource.id);
        Ok(outputs)
    }

    async fn delete(
        &self,
        resource: &ResourceContext,
        _inputs: &Properties,
        _outputs: &Properties,
    ) -> ProviderResult<()> {
        tracing::debug!(id = %resource.id, kind = %resource.kind, "Deleting");
        self.simulate(resource).await?;
        tracing::info!("Deleted {} '{}'", resource.kind, resource.id);
        Ok(())
    }
}
