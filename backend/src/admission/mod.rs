//! Deployment state machine
//!
//! The six operations that move a deployment through its lifecycle, each run
//! by the caller inside one store transaction (the cluster's exclusive shard
//! lock). The ledger side-effects are:
//!
//! - `start`: allocate, or leave the deployment PENDING
//! - `stop`: release, then enter the chosen terminal state
//! - `update`: release/allocate according to the status and footprint delta
//! - `delete`: release iff the deployment was RUNNING
//!
//! `start` and friends return `None` for ineligible targets rather than an
//! error: the scheduler probes with them and a refusal is a normal outcome.
//!
//! A `stop` into COMPLETED does not start dependents itself. It reports the
//! PENDING direct dependents in [`StopResult::cascade`]; the caller walks
//! that list after the transaction commits and attempts `start` for each in
//! its own transaction, so a long dependency chain never holds one
//! transaction open and the shard lock is never re-entered.

use crate::models::{
    Deployment, DeploymentId, DeploymentPriority, DeploymentStatus, Resources, ResourcesError,
    UserId,
};
use crate::store::ClusterShard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from `create` and `update`
#[derive(Debug, Error, PartialEq)]
pub enum AdmissionError {
    #[error("deployment {0} not found")]
    DeploymentNotFound(DeploymentId),

    #[error("dependency {0} not found in this cluster")]
    DependencyNotFound(DeploymentId),

    #[error("a deployment cannot depend on itself")]
    SelfDependency,

    #[error("dependency set would form a cycle")]
    DependencyCycle,

    #[error("status {0:?} cannot be patched directly; use start, stop or cancel")]
    TerminalStatusPatch(DeploymentStatus),

    #[error(transparent)]
    InvalidResources(#[from] ResourcesError),
}

/// Terminal outcome accepted by `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    Completed,
    Failed,
}

impl StopStatus {
    pub fn as_status(self) -> DeploymentStatus {
        match self {
            StopStatus::Completed => DeploymentStatus::Completed,
            StopStatus::Failed => DeploymentStatus::Failed,
        }
    }
}

impl Default for StopStatus {
    fn default() -> Self {
        StopStatus::Completed
    }
}

/// Inputs to `create`
#[derive(Debug, Clone)]
pub struct CreateOp {
    pub user_id: UserId,
    pub name: String,
    pub image_ref: String,
    pub required: Resources,
    pub priority: DeploymentPriority,
    pub dependency_ids: Vec<DeploymentId>,
}

/// Inputs to `update`; absent fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateOp {
    pub name: Option<String>,
    pub image_ref: Option<String>,
    pub required_ram: Option<f64>,
    pub required_cpu: Option<f64>,
    pub required_gpu: Option<f64>,
    pub priority: Option<DeploymentPriority>,
    pub status: Option<DeploymentStatus>,
    pub dependency_ids: Option<Vec<DeploymentId>>,
}

/// Result of a successful `stop`
#[derive(Debug, Clone)]
pub struct StopResult {
    pub deployment: Deployment,

    /// PENDING direct dependents to retry after the transaction commits.
    /// Empty unless the stop entered COMPLETED.
    pub cascade: Vec<DeploymentId>,
}

/// Validate a dependency id list for `dependent` against the shard
fn validate_dependencies(
    shard: &ClusterShard,
    dependent: DeploymentId,
    dependency_ids: &[DeploymentId],
) -> Result<(), AdmissionError> {
    for &dependency in dependency_ids {
        if dependency == dependent {
            return Err(AdmissionError::SelfDependency);
        }
        if !shard.deployments.contains_key(&dependency) {
            // Absent here also covers edges into other clusters: a shard only
            // holds same-cluster deployments.
            return Err(AdmissionError::DependencyNotFound(dependency));
        }
    }
    if shard.graph.would_form_cycle(dependent, dependency_ids) {
        return Err(AdmissionError::DependencyCycle);
    }
    Ok(())
}

/// Insert a PENDING deployment with its dependency edges
///
/// `id` must be freshly issued by the store. Rejects absent, cross-cluster
/// and self dependencies, and any edge set that would close a cycle.
pub fn create(
    shard: &mut ClusterShard,
    id: DeploymentId,
    op: CreateOp,
    now: DateTime<Utc>,
) -> Result<Deployment, AdmissionError> {
    op.required.validate_requirements()?;
    validate_dependencies(shard, id, &op.dependency_ids)?;

    let deployment = Deployment::new(
        id,
        shard.cluster.id(),
        op.user_id,
        op.name,
        op.image_ref,
        op.required,
        op.priority,
        now,
    );
    shard.deployments.insert(id, deployment.clone());
    shard.graph.set_dependencies(id, &op.dependency_ids);
    Ok(deployment)
}

/// Patch a deployment
///
/// Status patches are honoured only between the non-terminal states, with
/// the ledger semantics of the design:
///
/// - `RUNNING → PENDING` releases the *pre-update* footprint
/// - `PENDING → RUNNING` allocates the *post-update* footprint and silently
///   reverts the status (only) if allocation fails
/// - a footprint change while RUNNING releases the old footprint and
///   allocates the new one, reverting the footprint if the new allocation
///   fails (re-allocating the old footprint cannot fail: it was just
///   released under the same shard lock)
pub fn update(
    shard: &mut ClusterShard,
    id: DeploymentId,
    op: UpdateOp,
    now: DateTime<Utc>,
) -> Result<Deployment, AdmissionError> {
    let current = shard
        .deployments
        .get(&id)
        .ok_or(AdmissionError::DeploymentNotFound(id))?;
    let original_status = current.status();
    let original_required = current.required();

    let new_status = op.status.unwrap_or(original_status);
    if new_status != original_status && (new_status.is_terminal() || original_status.is_terminal()) {
        return Err(AdmissionError::TerminalStatusPatch(new_status));
    }

    let new_required = Resources::new(
        op.required_ram.unwrap_or(original_required.ram),
        op.required_cpu.unwrap_or(original_required.cpu),
        op.required_gpu.unwrap_or(original_required.gpu),
    );
    new_required.validate_requirements()?;

    if let Some(dependency_ids) = &op.dependency_ids {
        validate_dependencies(shard, id, dependency_ids)?;
        shard.graph.set_dependencies(id, dependency_ids);
    }

    let cluster = &mut shard.cluster;
    let deployment = shard
        .deployments
        .get_mut(&id)
        .ok_or(AdmissionError::DeploymentNotFound(id))?;

    if let Some(name) = op.name {
        deployment.set_name(name);
    }
    if let Some(image_ref) = op.image_ref {
        deployment.set_image_ref(image_ref);
    }
    if let Some(priority) = op.priority {
        deployment.set_priority(priority);
    }

    let leaving_running = original_status == DeploymentStatus::Running
        && new_status != DeploymentStatus::Running;
    let entering_running = original_status != DeploymentStatus::Running
        && new_status == DeploymentStatus::Running;

    if leaving_running {
        cluster.release(&original_required);
        deployment.set_required(new_required);
        deployment.mark_pending();
    } else if entering_running {
        deployment.set_required(new_required);
        if cluster.allocate(&new_required) {
            deployment.mark_running(now);
        }
        // else: footprint patch sticks, status silently stays as it was
    } else if original_status == DeploymentStatus::Running && new_required != original_required {
        cluster.release(&original_required);
        if cluster.allocate(&new_required) {
            deployment.set_required(new_required);
        } else {
            let _restored = cluster.allocate(&original_required);
            debug_assert!(_restored, "re-allocating the pre-update footprint cannot fail");
        }
    } else {
        deployment.set_required(new_required);
    }

    Ok(deployment.clone())
}

/// Attempt `PENDING → RUNNING`
///
/// Returns `None` (not an error) when the deployment is absent or not
/// PENDING, when any direct dependency is not COMPLETED at this instant, or
/// when the allocation fails. On success the footprint is reserved and
/// `started_at` is stamped before any concurrent observer can see the
/// deployment RUNNING (the caller holds the shard lock).
pub fn start(
    shard: &mut ClusterShard,
    id: DeploymentId,
    now: DateTime<Utc>,
) -> Option<Deployment> {
    let deployment = shard.deployments.get(&id)?;
    if !deployment.is_pending() {
        return None;
    }
    let required = deployment.required();

    for dependency in shard.graph.dependencies(id) {
        match shard.deployments.get(&dependency) {
            Some(d) if d.status() == DeploymentStatus::Completed => {}
            _ => return None,
        }
    }

    if !shard.cluster.allocate(&required) {
        return None;
    }

    let deployment = shard.deployments.get_mut(&id)?;
    deployment.mark_running(now);
    Some(deployment.clone())
}

/// Attempt `RUNNING → COMPLETED | FAILED`
///
/// Returns `None` when the deployment is absent or not RUNNING. Releases the
/// footprint and, for COMPLETED, reports the PENDING direct dependents for
/// the post-commit cascade walk.
pub fn stop(shard: &mut ClusterShard, id: DeploymentId, outcome: StopStatus) -> Option<StopResult> {
    let cluster = &mut shard.cluster;
    let deployment = shard.deployments.get_mut(&id)?;
    if !deployment.is_running() {
        return None;
    }

    cluster.release(&deployment.required());
    deployment.mark_stopped(outcome.as_status());
    let snapshot = deployment.clone();

    let cascade = match outcome {
        StopStatus::Completed => shard
            .graph
            .dependents(id)
            .into_iter()
            .filter(|d| shard.deployments.get(d).is_some_and(|x| x.is_pending()))
            .collect(),
        StopStatus::Failed => Vec::new(),
    };

    Some(StopResult {
        deployment: snapshot,
        cascade,
    })
}

/// Attempt `PENDING → CANCELLED`
///
/// Returns `None` when the deployment is absent or not PENDING. No resource
/// effect and no cascade: dependents stay blocked.
pub fn cancel(shard: &mut ClusterShard, id: DeploymentId) -> Option<Deployment> {
    let deployment = shard.deployments.get_mut(&id)?;
    if !deployment.is_pending() {
        return None;
    }
    deployment.mark_cancelled();
    Some(deployment.clone())
}

/// Remove a deployment from any state, releasing its footprint if RUNNING
/// and dropping every incident dependency edge
pub fn delete(shard: &mut ClusterShard, id: DeploymentId) -> bool {
    let Some(deployment) = shard.deployments.get(&id) else {
        return false;
    };
    if deployment.is_running() {
        let required = deployment.required();
        shard.cluster.release(&required);
    }
    shard.deployments.remove(&id);
    shard.graph.remove_incident(id);
    true
}
