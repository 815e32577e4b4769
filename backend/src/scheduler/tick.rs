//! Scheduler tick
//!
//! One sweep per cluster:
//!
//! 1. Load the PENDING deployments in admission order (priority descending,
//!    creation time ascending) and greedily attempt `start` on each.
//! 2. If HIGH-priority work is still pending, run the preemption pass:
//!    running deployments of strictly lower priority are stopped FAILED,
//!    oldest lowest-priority first, until the accumulated footprints cover
//!    the pending deployment's shortfall on every axis. If the shortfall
//!    cannot be covered, nothing is preempted.
//!
//! Priority-strict victim selection means a deployment is never preempted by
//! a peer; oldest-first selection keeps just-started work from being evicted
//! immediately. The greedy accumulation is monotone and O(|running|), not a
//! knapsack.
//!
//! Each cluster sweep runs inside that cluster's exclusive shard lock, so a
//! tick and concurrent API mutations serialize per cluster.

use crate::admission;
use crate::admission::StopStatus;
use crate::models::{ClusterId, DeploymentPriority, Resources};
use crate::store::{ClusterShard, Store};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Scheduler failures; a failed cluster never aborts the sweep of the others
#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("cluster {0} not found")]
    ClusterNotFound(ClusterId),
}

/// Per-cluster counters from one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Deployments moved PENDING → RUNNING this tick
    pub scheduled: usize,

    /// Running deployments stopped FAILED to make room
    pub preempted: usize,

    /// Deployments still PENDING when the sweep ended
    pub unschedulable: usize,
}

impl TickReport {
    /// Accumulate another report into this one
    pub fn merge(&mut self, other: &TickReport) {
        self.scheduled += other.scheduled;
        self.preempted += other.preempted;
        self.unschedulable += other.unschedulable;
    }
}

/// Sweeps clusters, admitting and preempting deployments
///
/// Owns no state between ticks; every sweep re-reads the store.
pub struct Scheduler {
    store: Arc<Store>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Sweep every cluster once
    ///
    /// A cluster that disappears mid-sweep is logged and skipped; the sweep
    /// always visits the remaining clusters.
    pub fn schedule_all(&self, now: DateTime<Utc>) -> BTreeMap<ClusterId, TickReport> {
        let mut results = BTreeMap::new();
        for cluster_id in self.store.cluster_ids() {
            match self.schedule_cluster(cluster_id, now) {
                Ok(report) => {
                    results.insert(cluster_id, report);
                }
                Err(err) => {
                    warn!(cluster = cluster_id, %err, "skipping cluster in scheduler sweep");
                }
            }
        }
        results
    }

    /// Sweep one cluster inside its exclusive shard lock
    pub fn schedule_cluster(
        &self,
        cluster_id: ClusterId,
        now: DateTime<Utc>,
    ) -> Result<TickReport, SchedulerError> {
        self.store
            .mutate_cluster(cluster_id, |shard| run_cluster_pass(shard, now))
            .ok_or(SchedulerError::ClusterNotFound(cluster_id))
    }
}

/// The per-cluster sweep, run under the shard lock
fn run_cluster_pass(shard: &mut ClusterShard, now: DateTime<Utc>) -> TickReport {
    let mut report = TickReport::default();

    // Greedy admission pass
    let mut remaining = Vec::new();
    for id in shard.pending_in_admission_order() {
        if admission::start(shard, id, now).is_some() {
            report.scheduled += 1;
        } else {
            remaining.push(id);
        }
    }

    // Preemption pass, only while HIGH-priority work is stuck
    let high_pending: Vec<_> = remaining
        .iter()
        .copied()
        .filter(|&id| {
            shard
                .deployment(id)
                .is_some_and(|d| d.priority() == DeploymentPriority::High)
        })
        .collect();

    if !high_pending.is_empty() {
        let ceiling = remaining
            .iter()
            .filter_map(|&id| shard.deployment(id))
            .map(|d| d.priority().value())
            .max()
            .unwrap_or(0);
        let mut victims = shard.preemption_candidates(ceiling);

        for id in high_pending {
            // Resources may have freed since the greedy pass
            if admission::start(shard, id, now).is_some() {
                report.scheduled += 1;
                continue;
            }

            let Some(pending) = shard.deployment(id) else {
                continue;
            };
            let shortfall = pending.required().shortfall(&shard.cluster.available());
            if shortfall.is_zero() {
                // Blocked by its dependency gate, not by capacity; stopping
                // victims cannot help
                continue;
            }

            let mut accumulated = Resources::zero();
            let mut chosen = Vec::new();
            for &victim in &victims {
                let Some(v) = shard.deployment(victim) else {
                    continue;
                };
                accumulated += v.required();
                chosen.push(victim);
                if accumulated.covers(&shortfall) {
                    break;
                }
            }

            if !accumulated.covers(&shortfall) {
                // Cannot free enough even by stopping every candidate: leave
                // the deployment pending and preempt nothing
                continue;
            }

            for &victim in &chosen {
                if admission::stop(shard, victim, StopStatus::Failed).is_some() {
                    report.preempted += 1;
                    info!(victim, for_deployment = id, "preempted lower-priority deployment");
                }
            }
            victims.retain(|v| !chosen.contains(v));

            if admission::start(shard, id, now).is_some() {
                report.scheduled += 1;
            } else {
                error!(deployment = id, "failed to start after preemption");
            }
        }
    }

    report.unschedulable = shard.deployments.values().filter(|d| d.is_pending()).count();
    report
}
