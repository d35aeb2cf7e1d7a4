//! Deletion of recorded resources, dependents before dependencies
//!
//! Used by destroy for everything in state, and by apply for recorded
//! resources that are no longer declared.

use crate::error::Result;
use crate::provider::{ResourceContext, delete_with_retry};
use crate::report::{DestroyReport, ResourceReport, ResourceStatus};
use crate::session::Session;
use crate::state::StateRecord;
use std::collections::HashMap;
use std::time::Instant;
use strata_core::{DependencyGraph, Deployment};

impl Session {
    /// Delete every recorded resource in reverse dependency order.
    ///
    /// When a deletion fails, the resources it depends on are left in place
    /// and reported as skipped.
    pub async fn destroy(&self) -> Result<DestroyReport> {
        let started = Instant::now();
        let records = self.records_by_id().await?;
        let ordered = deletion_order(records.values().collect())?;
        tracing::info!("Destroying {} recorded resources", ordered.len());

        let (resources, cancelled) = self.delete_records(ordered).await;

        let report = DestroyReport {
            resources,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Destroy finished: {}/{} deleted",
            report.deleted(),
            report.resources.len()
        );
        Ok(report)
    }

    /// Delete `records`, which must already be in deletion order.
    ///
    /// Returns one report per record and whether cancellation cut the run
    /// short.
    pub(crate) async fn delete_records(
        &self,
        records: Vec<&StateRecord>,
    ) -> (Vec<ResourceReport>, bool) {
        let mut reports = Vec::with_capacity(records.len());
        // id -> the resource whose failed deletion still needs it
        let mut blocked: HashMap<String, String> = HashMap::new();
        let mut cancelled = false;

        for record in records {
            let mut report =
                ResourceReport::new(&record.id, record.kind.clone(), ResourceStatus::Pending);

            if !cancelled && self.cancel.is_cancelled() {
                tracing::warn!("Cancellation requested; remaining deletions are skipped");
                cancelled = true;
            }

            if cancelled {
                report.status = ResourceStatus::Skipped;
                report.skipped_because = Some("run was cancelled".to_string());
            } else if let Some(user) = blocked.get(&record.id).cloned() {
                report.status = ResourceStatus::Skipped;
                report.skipped_because =
                    Some(format!("still used by '{user}', which was not deleted"));
                block_dependencies(&mut blocked, record, &user);
            } else {
                match self.delete_record(record).await {
                    Ok(attempts) => {
                        tracing::info!("Deleted {} '{}'", record.kind, record.id);
                        report.status = ResourceStatus::Deleted;
                        report.attempts = attempts;
                    }
                    Err((message, attempts)) => {
                        tracing::error!("Deleting '{}' failed: {}", record.id, message);
                        report.status = ResourceStatus::Failed;
                        report.error = Some(message);
                        report.attempts = attempts;
                        block_dependencies(&mut blocked, record, &record.id);
                    }
                }
            }
            reports.push(report);
        }

        (reports, cancelled)
    }

    async fn delete_record(&self, record: &StateRecord) -> std::result::Result<u32, (String, u32)> {
        let provider = self
            .providers
            .get(&record.kind)
            .map_err(|e| (e.to_string(), 0))?;
        let context = ResourceContext::new(&record.id, record.kind.clone());

        let (result, attempts) = delete_with_retry(
            &self.retry,
            provider.as_ref(),
            &context,
            &record.inputs,
            &record.outputs,
        )
        .await;
        result.map_err(|e| (e.message, attempts))?;

        self.state
            .remove(&record.id)
            .await
            .map_err(|e| (format!("deleted, but updating state failed: {e}"), attempts))?;
        Ok(attempts)
    }

    /// Delete recorded resources that `deployment` no longer declares.
    pub(crate) async fn prune_orphans(
        &self,
        deployment: &Deployment,
        records: &HashMap<String, StateRecord>,
    ) -> Result<Vec<ResourceReport>> {
        let orphans = deletion_order(orphans_of(deployment, records))?;
        if orphans.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!("Deleting {} resources no longer declared", orphans.len());
        let (reports, _) = self.delete_records(orphans).await;
        Ok(reports)
    }
}

fn block_dependencies(blocked: &mut HashMap<String, String>, record: &StateRecord, user: &str) {
    for dependency in &record.dependencies {
        blocked
            .entry(dependency.clone())
            .or_insert_with(|| user.to_string());
    }
}

/// Recorded resources that `deployment` does not declare, ordered by id
pub(crate) fn orphans_of<'r>(
    deployment: &Deployment,
    records: &'r HashMap<String, StateRecord>,
) -> Vec<&'r StateRecord> {
    let mut orphans: Vec<&StateRecord> = records
        .values()
        .filter(|record| !deployment.contains(&record.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));
    orphans
}

/// `records` ordered so every resource comes before the ones it depends on
///
/// Ties are broken by id, which keeps the order stable across runs.
pub(crate) fn deletion_order(mut records: Vec<&StateRecord>) -> Result<Vec<&StateRecord>> {
    records.sort_by(|a, b| a.id.cmp(&b.id));
    let graph = DependencyGraph::from_adjacency(
        records
            .iter()
            .map(|record| (record.id.clone(), record.dependencies.clone())),
    )?;
    Ok(graph.order().iter().rev().map(|&i| records[i]).collect())
}
