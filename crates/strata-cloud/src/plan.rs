//! Dry-run diff of a deployment against recorded state

use crate::action::{Action, ActionType, Plan, diff_against};
use crate::destroy::{deletion_order, orphans_of};
use crate::error::Result;
use crate::session::Session;
use crate::state::StateRecord;
use strata_core::{DependencyGraph, Deployment, Properties, Reference};

impl Session {
    /// Compute what an apply of `deployment` would do, without calling any
    /// provider.
    ///
    /// A resource whose inputs reference an upstream resource that will
    /// change cannot be diffed exactly; it is planned as a change and lists
    /// that upstream in `pending_upstream`.
    pub async fn plan(&self, deployment: &Deployment) -> Result<Plan> {
        let graph = DependencyGraph::build(deployment)?;
        self.providers.check(deployment)?;
        let records = self.records_by_id().await?;
        let resources = deployment.resources();

        let mut known: Vec<Option<&Properties>> = vec![None; graph.len()];
        let mut actions = Vec::with_capacity(graph.len() + records.len());

        for &node in graph.order() {
            let resource = &resources[node];
            let previous = records.get(&resource.id);
            let pending: Vec<String> = graph
                .dependencies(node)
                .filter(|&dep| known[dep].is_none())
                .map(|dep| graph.id(dep).to_string())
                .collect();

            let action = if pending.is_empty() {
                let lookup = |r: &Reference| {
                    graph
                        .index_of(&r.resource)
                        .and_then(|i| known[i])
                        .and_then(|outputs| outputs.get(&r.output))
                        .cloned()
                };
                match resource.resolve_inputs(&lookup) {
                    Ok(inputs) => {
                        let (action_type, changed) =
                            diff_against(previous, &resource.kind, &inputs);
                        Action::new(&resource.id, resource.kind.clone(), action_type)
                            .with_changed_inputs(changed)
                    }
                    Err(reference) => {
                        let action_type = forced_change(previous, resource);
                        let mut action =
                            Action::new(&resource.id, resource.kind.clone(), action_type);
                        action.description =
                            format!("{} ({} is not recorded)", action.description, reference);
                        action
                    }
                }
            } else {
                Action::new(&resource.id, resource.kind.clone(), forced_change(previous, resource))
                    .with_pending_upstream(pending)
            };

            if action.action_type == ActionType::NoOp {
                known[node] = previous.map(|record| &record.outputs);
            }
            actions.push(action);
        }

        actions.extend(
            deletion_order(orphans_of(deployment, &records))?
                .into_iter()
                .map(|record| Action::new(&record.id, record.kind.clone(), ActionType::Delete)),
        );

        let plan = Plan::new(actions);
        tracing::debug!("Planned '{}': {}", deployment.name, plan.summary());
        Ok(plan)
    }
}

fn forced_change(previous: Option<&StateRecord>, resource: &strata_core::Resource) -> ActionType {
    match previous {
        None => ActionType::Create,
        Some(record) if record.kind != resource.kind => ActionType::Replace,
        Some(_) => ActionType::Update,
    }
}
