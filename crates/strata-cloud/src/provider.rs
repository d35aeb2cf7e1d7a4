//! Resource provider trait definition

use crate::error::{CloudError, ProviderResult, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Deployment, Properties, ResourceKind};

/// Identity of the resource a provider call acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceContext {
    pub id: String,
    pub kind: ResourceKind,
}

impl ResourceContext {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Resource provider abstraction trait
///
/// A provider turns resolved inputs into a real object and reports the
/// outputs the object exposes. The engine never interprets inputs or
/// outputs; it only routes them between resources.
///
/// Calls are made from worker tasks, possibly several at a time for
/// different resources, which is why implementations must be `Send + Sync`.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Create the object and return its outputs
    async fn create(
        &self,
        resource: &ResourceContext,
        inputs: &Properties,
    ) -> ProviderResult<Properties>;

    /// Move an existing object from its recorded inputs to `inputs`
    async fn update(
        &self,
        resource: &ResourceContext,
        previous_inputs: &Properties,
        previous_outputs: &Properties,
        inputs: &Properties,
    ) -> ProviderResult<Properties>;

    /// Delete the object described by its recorded inputs and outputs
    async fn delete(
        &self,
        resource: &ResourceContext,
        inputs: &Properties,
        outputs: &Properties,
    ) -> ProviderResult<()>;
}

/// Maps resource kinds to the provider that handles them
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    by_kind: HashMap<ResourceKind, Arc<dyn ResourceProvider>>,
    fallback: Option<Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, provider: Arc<dyn ResourceProvider>) {
        self.by_kind.insert(kind, provider);
    }

    pub fn with_provider(
        mut self,
        kind: ResourceKind,
        provider: Arc<dyn ResourceProvider>,
    ) -> Self {
        self.register(kind, provider);
        self
    }

    /// Provider used for every kind without a dedicated registration
    pub fn with_fallback(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn get(&self, kind: &ResourceKind) -> Result<Arc<dyn ResourceProvider>> {
        self.by_kind
            .get(kind)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotFound(kind.to_string()))
    }

    /// Ensure every resource in `deployment` has a provider.
    pub fn check(&self, deployment: &Deployment) -> Result<()> {
        for resource in deployment.resources() {
            self.get(&resource.kind)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.keys().map(ResourceKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("kinds", &kinds)
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt and no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt number `attempt + 1`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently or attempts run out.
    ///
    /// Returns the final result together with the number of attempts made.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> (ProviderResult<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(error) if error.retryable && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt,
                        max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}

pub(crate) async fn create_with_retry(
    retry: &RetryConfig,
    provider: &dyn ResourceProvider,
    resource: &ResourceContext,
    inputs: &Properties,
) -> (ProviderResult<Properties>, u32) {
    let operation = format!("create '{}'", resource.id);
    retry
        .run(&operation, move || provider.create(resource, inputs))
        .await
}

pub(crate) async fn update_with_retry(
    retry: &RetryConfig,
    provider: &dyn ResourceProvider,
    resource: &ResourceContext,
    previous_inputs: &Properties,
    previous_outputs: &Properties,
    inputs: &Properties,
) -> (ProviderResult<Properties>, u32) {
    let operation = format!("update '{}'", resource.id);
    retry
        .run(&operation, move || {
            provider.update(resource, previous_inputs, previous_outputs, inputs)
        })
        .await
}

pub(crate) async fn delete_with_retry(
    retry: &RetryConfig,
    provider: &dyn ResourceProvider,
    resource: &ResourceContext,
    inputs: &Properties,
    outputs: &Properties,
) -> (ProviderResult<()>, u32) {
    let operation = format!("delete '{}'", resource.id);
    retry
        .run(&operation, move || provider.delete(resource, inputs, outputs))
        .await
}
