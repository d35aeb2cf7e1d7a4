#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_cloud::{
    MemoryStateStore, ProviderError, ProviderRegistry, ProviderResult, ResourceContext,
    ResourceProvider, RetryConfig, Session,
};
use strata_core::{Deployment, EngineSettings, Properties, Resource, ResourceKind, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub id: String,
    pub inputs: Properties,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Retryable(usize),
    Panic,
}

/// Provider that records every call and answers with predictable outputs
///
/// Outputs are the inputs plus `id` (`mock-<id>`) and `arn`, so a changed
/// input is visible to anything referencing it.
#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<(Op, String), Failure>>,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn fail(&self, op: Op, id: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, id.to_string()), Failure::Always);
    }

    pub fn fail_times(&self, op: Op, id: &str, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, id.to_string()), Failure::Retryable(times));
    }

    pub fn panic_on(&self, op: Op, id: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, id.to_string()), Failure::Panic);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Cancel `token` once the create of `id` has been made
    pub fn cancel_after_create(&self, id: &str, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((id.to_string(), token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_ids(&self) -> Vec<(Op, String)> {
        self.calls().into_iter().map(|c| (c.op, c.id)).collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn call(
        &self,
        op: Op,
        resource: &ResourceContext,
        inputs: &Properties,
    ) -> ProviderResult<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            id: resource.id.clone(),
            inputs: inputs.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = {
            let mut failures = self.failures.lock().unwrap();
            let key = (op, resource.id.clone());
            match failures.get(&key).copied() {
                Some(Failure::Retryable(0)) => {
                    failures.remove(&key);
                    None
                }
                Some(Failure::Retryable(left)) => {
                    failures.insert(key, Failure::Retryable(left - 1));
                    Some(Failure::Retryable(left))
                }
                other => other,
            }
        };

        match failure {
            None => Ok(()),
            Some(Failure::Always) => Err(ProviderError::new(format!("{} rejected", resource.id))),
            Some(Failure::Retryable(_)) => Err(ProviderError::retryable("throttled")),
            Some(Failure::Panic) => panic!("provider blew up on {}", resource.id),
        }
    }

    fn outputs(resource: &ResourceContext, inputs: &Properties) -> Properties {
        let mut outputs = inputs.clone();
        outputs.insert("id".into(), json!(format!("mock-{}", resource.id)));
        outputs.insert(
            "arn".into(),
            json!(format!("arn:mock:{}/{}", resource.kind, resource.id)),
        );
        outputs
    }
}

#[async_trait]
impl ResourceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create(
        &self,
        resource: &ResourceContext,
        inputs: &Properties,
    ) -> ProviderResult<Properties> {
        let result = self.call(Op::Create, resource, inputs).await;

        let cancel = self.cancel_after.lock().unwrap().clone();
        if let Some((id, token)) = cancel
            && id == resource.id
        {
            token.cancel();
        }

        result.map(|()| Self::outputs(resource, inputs))
    }

    async fn update(
        &self,
        resource: &ResourceContext,
        _previous_inputs: &Properties,
        _previous_outputs: &Properties,
        inputs: &Properties,
    ) -> ProviderResult<Properties> {
        self.call(Op::Update, resource, inputs).await?;
        Ok(Self::outputs(resource, inputs))
    }

    async fn delete(
        &self,
        resource: &ResourceContext,
        inputs: &Properties,
        _outputs: &Properties,
    ) -> ProviderResult<()> {
        self.call(Op::Delete, resource, inputs).await
    }
}

pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn session(provider: &Arc<MockProvider>, store: &Arc<MemoryStateStore>) -> Session {
    session_with(provider, store, EngineSettings::default())
}

pub fn session_with(
    provider: &Arc<MockProvider>,
    store: &Arc<MemoryStateStore>,
    settings: EngineSettings,
) -> Session {
    let provider: Arc<dyn ResourceProvider> = provider.clone();
    let store: Arc<dyn strata_cloud::StateStore> = store.clone();
    Session::new(ProviderRegistry::new().with_fallback(provider), store)
        .with_settings(settings)
        .with_retry(quick_retry())
}

/// Network, subnet and security group, and a database using both
pub fn example_stack() -> Deployment {
    Deployment::new("example")
        .with_resource(
            Resource::new(ResourceKind::Network, "vpc").with_input("cidr_block", "10.0.0.0/16"),
        )
        .unwrap()
        .with_resource(
            Resource::new(ResourceKind::Subnet, "subnet")
                .with_input("vpc_id", Value::reference("vpc", "id"))
                .with_input("cidr_block", "10.0.1.0/24"),
        )
        .unwrap()
        .with_resource(
            Resource::new(ResourceKind::SecurityGroup, "sg")
                .with_input("vpc_id", Value::reference("vpc", "id"))
                .with_input("port", Value::Integer(5432)),
        )
        .unwrap()
        .with_resource(
            Resource::new(ResourceKind::Database, "db")
                .with_input("subnet_id", Value::reference("subnet", "id"))
                .with_input("security_group_ids", Value::list([Value::reference("sg", "id")]))
                .with_input("engine", "postgres"),
        )
        .unwrap()
        .with_output(strata_core::Output::new("db_arn", Value::reference("db", "arn")))
        .unwrap()
        .with_output(strata_core::Output::new("vpc_id", Value::reference("vpc", "id")))
        .unwrap()
}

/// `count` resources that reference nothing
pub fn independent(count: usize) -> Deployment {
    let mut deployment = Deployment::new("flat");
    for i in 0..count {
        deployment
            .register(
                Resource::new(ResourceKind::Role, format!("role-{i}"))
                    .with_input("index", Value::Integer(i as i64)),
            )
            .unwrap();
    }
    deployment
}

pub fn position(calls: &[(Op, String)], op: Op, id: &str) -> usize {
    calls
        .iter()
        .position(|(o, i)| *o == op && i == id)
        .unwrap_or_else(|| panic!("no {op:?} call for {id}"))
}
