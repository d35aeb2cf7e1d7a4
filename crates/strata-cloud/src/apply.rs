//! Concurrent, dependency-ordered apply
//!
//! One scheduler loop owns every resource's status and outputs. Provider
//! calls run as tasks in a [`JoinSet`], at most `concurrency` at a time, and
//! report back to the loop; nothing else mutates run state.
//!
//! A resource becomes ready when all of its dependencies are applied. Ready
//! resources are dispatched in declaration order, so a run over the same
//! deployment always makes the same choices when several are ready at once.

use crate::action::{ActionType, diff_against};
use crate::destroy::orphans_of;
use crate::error::{ProviderError, ProviderResult, Result};
use crate::export::export_outputs;
use crate::provider::{
    ResourceContext, ResourceProvider, RetryConfig, create_with_retry, delete_with_retry,
    update_with_retry,
};
use crate::report::{ApplyReport, ResourceReport, ResourceStatus};
use crate::session::Session;
use crate::state::StateRecord;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use strata_core::{
    DependencyGraph, Deployment, FailurePolicy, Properties, Reference, Resource, RollbackPolicy,
};
use tokio::task::{JoinError, JoinSet};

impl Session {
    /// Apply `deployment`, creating, updating or replacing each resource in
    /// dependency order.
    ///
    /// Graph errors (missing references, cycles) and missing providers are
    /// returned before any provider call. Everything that goes wrong after
    /// that is reported per resource in the [`ApplyReport`].
    pub async fn apply(&self, deployment: &Deployment) -> Result<ApplyReport> {
        let started = Instant::now();
        let graph = DependencyGraph::build(deployment)?;
        self.providers.check(deployment)?;
        let previous = self.records_by_id().await?;

        tracing::info!(
            "Applying '{}': {} resources, up to {} at a time",
            deployment.name,
            graph.len(),
            self.settings.worker_limit()
        );

        let mut scheduler = Scheduler::new(self, deployment, &graph, &previous);
        scheduler.run().await?;
        let cancelled = scheduler.cancelled;
        let mut slots = scheduler.into_slots();

        let succeeded = slots
            .iter()
            .all(|s| !matches!(s.status, ResourceStatus::Failed | ResourceStatus::Skipped));

        let mut rolled_back = false;
        if !succeeded && self.settings.rollback_policy == RollbackPolicy::Transactional {
            self.roll_back(deployment, &graph, &previous, &mut slots).await;
            rolled_back = true;
        }

        let (pruned, kept_orphans) = if succeeded && !cancelled {
            (self.prune_orphans(deployment, &previous).await?, Vec::new())
        } else {
            let kept = orphans_of(deployment, &previous)
                .into_iter()
                .map(|r| r.id.clone())
                .collect();
            (Vec::new(), kept)
        };

        let outputs = export_outputs(deployment.outputs(), |id| {
            let slot = graph
                .index_of(id)
                .map(|i| &slots[i])
                .ok_or_else(|| format!("resource '{id}' is not declared"))?;
            match (&slot.status, &slot.outputs) {
                (ResourceStatus::Applied, Some(outputs)) => Ok(outputs),
                (status, _) => Err(format!("resource '{id}' is {status}")),
            }
        });

        let resources = deployment
            .resources()
            .iter()
            .zip(slots)
            .map(|(resource, slot)| slot.into_report(resource))
            .collect();

        let report = ApplyReport {
            stack: deployment.name.clone(),
            resources,
            pruned,
            kept_orphans,
            outputs,
            rolled_back,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!("Apply of '{}' finished: {}", deployment.name, report.summary());
        Ok(report)
    }

    /// Undo what this run applied, dependents first.
    ///
    /// Created resources are deleted, updated ones are moved back to their
    /// recorded inputs and replaced ones are recreated from their record. A
    /// replace that failed after deleting the recorded object gets that
    /// object back too.
    async fn roll_back(
        &self,
        deployment: &Deployment,
        graph: &DependencyGraph,
        previous: &HashMap<String, StateRecord>,
        slots: &mut [Slot],
    ) {
        tracing::warn!("Rolling back '{}'", deployment.name);

        for &node in graph.order().iter().rev() {
            let slot = &slots[node];
            let resource = &deployment.resources()[node];

            if slot.status == ResourceStatus::Failed && slot.previous_deleted {
                let Some(record) = previous.get(&resource.id) else {
                    continue;
                };
                match self.recreate(record).await {
                    Ok(()) => tracing::info!("Restored replaced '{}'", resource.id),
                    Err(error) => {
                        tracing::error!("Restoring replaced '{}' failed: {}", resource.id, error);
                        let failed = slots[node].error.take().unwrap_or_default();
                        slots[node].error = Some(format!("{failed}; rollback failed: {error}"));
                    }
                }
                continue;
            }

            let changed = slot.action.is_some_and(|a| a.is_change());
            if slot.status != ResourceStatus::Applied || !changed {
                continue;
            }

            match self.undo(resource, slot, previous.get(&resource.id)).await {
                Ok(()) => {
                    tracing::info!("Rolled back '{}'", resource.id);
                    slots[node].status = ResourceStatus::RolledBack;
                }
                Err(error) => {
                    tracing::error!("Rolling back '{}' failed: {}", resource.id, error);
                    slots[node].error = Some(format!("rollback failed: {error}"));
                }
            }
        }
    }

    async fn undo(
        &self,
        resource: &Resource,
        slot: &Slot,
        previous: Option<&StateRecord>,
    ) -> Result<()> {
        let provider = self.providers.get(&resource.kind)?;
        let context = ResourceContext::new(&resource.id, resource.kind.clone());
        let outputs = slot.outputs.clone().unwrap_or_default();

        match (slot.action, previous) {
            (Some(ActionType::Update), Some(record)) => {
                let (restored, _) = update_with_retry(
                    &self.retry,
                    provider.as_ref(),
                    &context,
                    &slot.inputs,
                    &outputs,
                    &record.inputs,
                )
                .await;
                let restored = record.clone().updated(
                    record.inputs.clone(),
                    restored?,
                    record.dependencies.clone(),
                );
                self.state.put(restored).await?;
            }
            (Some(ActionType::Replace), Some(record)) => {
                let (deleted, _) = delete_with_retry(
                    &self.retry,
                    provider.as_ref(),
                    &context,
                    &slot.inputs,
                    &outputs,
                )
                .await;
                deleted?;
                self.recreate(record).await?;
            }
            _ => {
                let (deleted, _) = delete_with_retry(
                    &self.retry,
                    provider.as_ref(),
                    &context,
                    &slot.inputs,
                    &outputs,
                )
                .await;
                deleted?;
                self.state.remove(&resource.id).await?;
            }
        }
        Ok(())
    }

    /// Create the object `record` describes again, with its own kind's
    /// provider, and record the new outputs.
    async fn recreate(&self, record: &StateRecord) -> Result<()> {
        let provider = self.providers.get(&record.kind)?;
        let context = ResourceContext::new(&record.id, record.kind.clone());
        let (recreated, _) =
            create_with_retry(&self.retry, provider.as_ref(), &context, &record.inputs).await;
        let restored = record.clone().updated(
            record.inputs.clone(),
            recreated?,
            record.dependencies.clone(),
        );
        self.state.put(restored).await?;
        Ok(())
    }
}

/// Run state of one declared resource
#[derive(Debug)]
struct Slot {
    status: ResourceStatus,
    action: Option<ActionType>,
    /// Resolved inputs, once known
    inputs: Properties,
    outputs: Option<Properties>,
    error: Option<String>,
    skipped_because: Option<String>,
    attempts: u32,
    /// A failed replace deleted the recorded object
    previous_deleted: bool,
}

impl Slot {
    fn pending() -> Self {
        Self {
            status: ResourceStatus::Pending,
            action: None,
            inputs: Properties::new(),
            outputs: None,
            error: None,
            skipped_because: None,
            attempts: 0,
            previous_deleted: false,
        }
    }

    fn into_report(self, resource: &Resource) -> ResourceReport {
        ResourceReport {
            id: resource.id.clone(),
            kind: resource.kind.clone(),
            status: self.status,
            action: self.action,
            outputs: self.outputs.unwrap_or_default(),
            error: self.error,
            skipped_because: self.skipped_because,
            attempts: self.attempts,
        }
    }
}

/// Everything a worker needs, owned so the task can be spawned
struct Job {
    node: usize,
    action: ActionType,
    context: ResourceContext,
    provider: Arc<dyn ResourceProvider>,
    inputs: Properties,
    previous: Option<StateRecord>,
    /// Provider of the recorded kind, for a replace
    previous_provider: Option<Arc<dyn ResourceProvider>>,
    retry: RetryConfig,
}

struct Finished {
    node: usize,
    result: ProviderResult<Properties>,
    attempts: u32,
    /// A replace deleted the recorded object before its create failed
    previous_deleted: bool,
}

enum Event {
    Joined(Option<std::result::Result<Finished, JoinError>>),
    Cancelled,
}

struct Scheduler<'a> {
    session: &'a Session,
    deployment: &'a Deployment,
    graph: &'a DependencyGraph,
    previous: &'a HashMap<String, StateRecord>,
    slots: Vec<Slot>,
    /// Dependencies of each resource not yet applied
    waiting_on: Vec<usize>,
    ready: BTreeSet<usize>,
    jobs: JoinSet<Finished>,
    /// Why no further resources are dispatched
    halted: Option<String>,
    cancelled: bool,
}

impl<'a> Scheduler<'a> {
    fn new(
        session: &'a Session,
        deployment: &'a Deployment,
        graph: &'a DependencyGraph,
        previous: &'a HashMap<String, StateRecord>,
    ) -> Self {
        let waiting_on: Vec<usize> = (0..graph.len()).map(|n| graph.dependency_count(n)).collect();
        let ready = waiting_on
            .iter()
            .enumerate()
            .filter(|(_, waiting)| **waiting == 0)
            .map(|(node, _)| node)
            .collect();

        Self {
            session,
            deployment,
            graph,
            previous,
            slots: (0..graph.len()).map(|_| Slot::pending()).collect(),
            waiting_on,
            ready,
            jobs: JoinSet::new(),
            halted: None,
            cancelled: false,
        }
    }

    fn into_slots(self) -> Vec<Slot> {
        self.slots
    }

    async fn run(&mut self) -> Result<()> {
        let cancel = self.session.cancel.clone();
        let limit = self.session.settings.worker_limit();

        loop {
            while self.halted.is_none() && self.jobs.len() < limit {
                if cancel.is_cancelled() {
                    self.cancel_run();
                    break;
                }
                let Some(node) = self.ready.pop_first() else {
                    break;
                };
                self.start(node);
            }

            if self.jobs.is_empty() {
                break;
            }

            let accepting = self.halted.is_none();
            let event = tokio::select! {
                joined = self.jobs.join_next() => Event::Joined(joined),
                _ = cancel.cancelled(), if accepting => Event::Cancelled,
            };

            match event {
                Event::Cancelled => self.cancel_run(),
                Event::Joined(None) => break,
                Event::Joined(Some(joined)) => self.finish(joined?).await,
            }
        }

        self.skip_unreached();
        Ok(())
    }

    fn set_status(&mut self, node: usize, status: ResourceStatus) {
        let slot = &mut self.slots[node];
        debug_assert!(
            slot.status.can_become(status),
            "'{}' cannot go from {} to {}",
            self.graph.id(node),
            slot.status,
            status
        );
        tracing::trace!("'{}': {} -> {}", self.graph.id(node), slot.status, status);
        slot.status = status;
    }

    /// Resolve inputs and either finish the resource at once (unchanged, or
    /// unresolvable) or hand it to a worker.
    fn start(&mut self, node: usize) {
        let deployment = self.deployment;
        let previous_records = self.previous;
        let resource = &deployment.resources()[node];
        self.set_status(node, ResourceStatus::ResolvingInputs);

        let resolved = {
            let graph = self.graph;
            let slots = &self.slots;
            let lookup = |r: &Reference| {
                graph
                    .index_of(&r.resource)
                    .and_then(|i| slots[i].outputs.as_ref())
                    .and_then(|outputs| outputs.get(&r.output))
                    .cloned()
            };
            resource.resolve_inputs(&lookup)
        };
        let inputs = match resolved {
            Ok(inputs) => inputs,
            Err(reference) => {
                let message = format!(
                    "input reference '{}' cannot be resolved: '{}' produced no output '{}'",
                    reference, reference.resource, reference.output
                );
                self.fail(node, message, 0);
                return;
            }
        };

        let previous = previous_records.get(&resource.id);
        let (action, changed) = diff_against(previous, &resource.kind, &inputs);
        self.slots[node].action = Some(action);

        if let (ActionType::NoOp, Some(record)) = (action, previous) {
            tracing::debug!("'{}' is up to date", resource.id);
            let slot = &mut self.slots[node];
            slot.inputs = inputs;
            slot.outputs = Some(record.outputs.clone());
            self.set_status(node, ResourceStatus::Applied);
            self.release(node);
            return;
        }

        let provider = match self.session.providers.get(&resource.kind) {
            Ok(provider) => provider,
            Err(error) => {
                self.fail(node, error.to_string(), 0);
                return;
            }
        };
        let previous_provider = match (action, previous) {
            (ActionType::Replace, Some(record)) => match self.session.providers.get(&record.kind) {
                Ok(provider) => Some(provider),
                Err(error) => {
                    self.fail(node, format!("cannot delete the recorded object: {error}"), 0);
                    return;
                }
            },
            _ => None,
        };

        if changed.is_empty() {
            tracing::info!("{} {} '{}'", action, resource.kind, resource.id);
        } else {
            tracing::info!(
                "{} {} '{}' ({} changed)",
                action,
                resource.kind,
                resource.id,
                changed.join(", ")
            );
        }

        self.slots[node].inputs = inputs.clone();
        self.set_status(node, ResourceStatus::Applying);
        self.jobs.spawn(run_job(Job {
            node,
            action,
            context: ResourceContext::new(&resource.id, resource.kind.clone()),
            provider,
            inputs,
            previous: previous.cloned(),
            previous_provider,
            retry: self.session.retry.clone(),
        }));
    }

    async fn finish(&mut self, finished: Finished) {
        let Finished {
            node,
            result,
            attempts,
            previous_deleted,
        } = finished;
        let deployment = self.deployment;
        let resource = &deployment.resources()[node];
        self.slots[node].attempts = attempts;

        let outputs = match result {
            Ok(outputs) => outputs,
            Err(error) => {
                if previous_deleted {
                    self.slots[node].previous_deleted = true;
                    if let Err(state_error) = self.session.state.remove(&resource.id).await {
                        tracing::error!(
                            "Forgetting replaced '{}' failed: {}",
                            resource.id,
                            state_error
                        );
                    }
                }
                self.fail(node, error.message, attempts);
                return;
            }
        };

        let dependencies = resource
            .dependency_ids()
            .into_iter()
            .map(String::from)
            .collect();
        let inputs = self.slots[node].inputs.clone();
        let record = match (self.slots[node].action, self.previous.get(&resource.id)) {
            (Some(ActionType::Update), Some(previous)) => {
                previous.clone().updated(inputs, outputs.clone(), dependencies)
            }
            _ => StateRecord::new(
                &resource.id,
                resource.kind.clone(),
                inputs,
                outputs.clone(),
                dependencies,
            ),
        };

        if let Err(error) = self.session.state.put(record).await {
            self.fail(node, format!("applied, but recording state failed: {error}"), attempts);
            return;
        }

        tracing::info!("Applied {} '{}'", resource.kind, resource.id);
        self.slots[node].outputs = Some(outputs);
        self.set_status(node, ResourceStatus::Applied);
        self.release(node);
    }

    /// Mark `node` failed and skip everything downstream of it.
    fn fail(&mut self, node: usize, message: String, attempts: u32) {
        let graph = self.graph;
        let id = graph.id(node);
        tracing::error!("'{}' failed: {}", id, message);

        let slot = &mut self.slots[node];
        slot.error = Some(message);
        slot.attempts = attempts;
        self.set_status(node, ResourceStatus::Failed);

        for dependent in graph.transitive_dependents(node) {
            if self.slots[dependent].status == ResourceStatus::Pending {
                tracing::warn!("Skipping '{}': depends on failed '{}'", graph.id(dependent), id);
                self.set_status(dependent, ResourceStatus::Skipped);
                self.slots[dependent].skipped_because =
                    Some(format!("depends on failed resource '{id}'"));
                self.ready.remove(&dependent);
            }
        }

        if self.session.settings.failure_policy == FailurePolicy::StopOnFirstError {
            self.halt(format!("run stopped after '{id}' failed"));
        }
    }

    fn release(&mut self, node: usize) {
        let graph = self.graph;
        for dependent in graph.dependents(node) {
            self.waiting_on[dependent] -= 1;
            let pending = self.slots[dependent].status == ResourceStatus::Pending;
            if self.waiting_on[dependent] == 0 && pending {
                self.ready.insert(dependent);
            }
        }
    }

    fn cancel_run(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        tracing::warn!(
            "Cancellation requested; waiting for {} in-flight provider calls",
            self.jobs.len()
        );
        self.halt("run was cancelled".to_string());
    }

    fn halt(&mut self, reason: String) {
        if self.halted.is_none() {
            self.halted = Some(reason);
        }
    }

    fn skip_unreached(&mut self) {
        let reason = self
            .halted
            .clone()
            .unwrap_or_else(|| "not reached".to_string());
        for node in 0..self.slots.len() {
            if self.slots[node].status == ResourceStatus::Pending {
                self.set_status(node, ResourceStatus::Skipped);
                self.slots[node].skipped_because = Some(reason.clone());
            }
        }
        self.ready.clear();
    }
}

/// Run the provider calls of one job. The delete and create halves of a
/// replace are guarded separately, so a panicking create still reports that
/// the recorded object is gone.
async fn run_job(job: Job) -> Finished {
    let Job {
        node,
        action,
        context,
        provider,
        inputs,
        previous,
        previous_provider,
        retry,
    } = job;

    let mut previous_deleted = false;
    let (result, attempts) = match (action, previous.as_ref()) {
        (ActionType::Update, Some(record)) => {
            guarded(update_with_retry(
                &retry,
                provider.as_ref(),
                &context,
                &record.inputs,
                &record.outputs,
                &inputs,
            ))
            .await
        }
        (ActionType::Replace, Some(record)) => {
            let old_provider = previous_provider.as_deref().unwrap_or(provider.as_ref());
            let old_context = ResourceContext::new(&record.id, record.kind.clone());
            let (deleted, delete_attempts) = guarded(delete_with_retry(
                &retry,
                old_provider,
                &old_context,
                &record.inputs,
                &record.outputs,
            ))
            .await;

            match deleted {
                Err(error) => (
                    Err(ProviderError {
                        message: format!(
                            "deleting the recorded {} failed: {}",
                            record.kind, error.message
                        ),
                        ..error
                    }),
                    delete_attempts,
                ),
                Ok(()) => {
                    previous_deleted = true;
                    let (created, create_attempts) =
                        guarded(create_with_retry(&retry, provider.as_ref(), &context, &inputs))
                            .await;
                    (created, delete_attempts + create_attempts)
                }
            }
        }
        _ => guarded(create_with_retry(&retry, provider.as_ref(), &context, &inputs)).await,
    };

    Finished {
        node,
        result,
        attempts,
        previous_deleted,
    }
}

/// Await a provider call, turning a panic into a failed attempt
async fn guarded<T>(
    call: impl Future<Output = (ProviderResult<T>, u32)>,
) -> (ProviderResult<T>, u32) {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = format!("provider panicked: {}", panic_message(panic.as_ref()));
            (Err(ProviderError::new(message)), 1)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
