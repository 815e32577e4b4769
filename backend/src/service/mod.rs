//! Admission service
//!
//! The synchronous API-facing layer: it resolves and authorizes the caller
//! against the owning organization, translates request DTOs into internal
//! operations, runs one store transaction per request, and maps every
//! outcome onto the error kinds of [`crate::error::ApiError`].
//!
//! Authentication (token validation) is an external collaborator: callers
//! arrive here already resolved to a principal id. Authorization is the
//! membership predicate: a principal may mutate a cluster or one of its
//! deployments only as a member of the owning organization.
//!
//! A `stop` that completes a deployment walks the cascade *after* its own
//! transaction commits: each PENDING dependent gets a fresh `start` attempt
//! in its own transaction, so long chains never pin the shard lock and a
//! failed start simply leaves the dependent for the next scheduler tick.

pub mod dto;

use crate::admission::{self, AdmissionError, CreateOp, StopStatus, UpdateOp};
use crate::error::ApiError;
use crate::models::{ClusterId, DeploymentId, OrganizationId, Resources, UserId};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

pub use dto::{
    ClusterCreate, ClusterUpdate, ClusterView, DeploymentCreate, DeploymentUpdate, DeploymentView,
};

/// API-facing facade over the store and the deployment state machine
pub struct AdmissionService {
    store: Arc<Store>,
}

impl AdmissionService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    fn require_user(&self, principal: UserId) -> Result<(), ApiError> {
        if self.store.user(principal).is_some() {
            Ok(())
        } else {
            Err(ApiError::Unauthorized(format!("unknown principal {}", principal)))
        }
    }

    fn require_member(&self, principal: UserId, org_id: OrganizationId) -> Result<(), ApiError> {
        if self.store.is_member(principal, org_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "user {} is not a member of organization {}",
                principal, org_id
            )))
        }
    }

    /// Resolve a cluster to its owning organization and check membership
    fn authorize_cluster(&self, principal: UserId, cluster_id: ClusterId) -> Result<(), ApiError> {
        let org_id = self
            .store
            .read_cluster(cluster_id, |shard| shard.cluster.organization_id())
            .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", cluster_id)))?;
        self.require_member(principal, org_id)
    }

    /// Resolve a deployment to its cluster, with a 404 when either is gone
    fn locate_deployment(&self, id: DeploymentId) -> Result<ClusterId, ApiError> {
        self.store
            .cluster_of(id)
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))
    }

    // ========================================================================
    // Deployments
    // ========================================================================

    pub fn create_deployment(
        &self,
        principal: UserId,
        req: DeploymentCreate,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        req.validate()?;
        self.authorize_cluster(principal, req.cluster_id)?;

        let id = self.store.issue_id();
        let now = Utc::now();
        let op = CreateOp {
            user_id: principal,
            name: req.name,
            image_ref: req.docker_image,
            required: Resources::new(req.required_ram, req.required_cpu, req.required_gpu),
            priority: req.priority,
            dependency_ids: req.dependency_ids,
        };

        let created = self
            .store
            .mutate_cluster(req.cluster_id, |shard| admission::create(shard, id, op, now))
            .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", req.cluster_id)))?
            .map_err(map_admission_error)?;
        self.store.register_deployment(id, req.cluster_id);

        debug!(deployment = id, cluster = req.cluster_id, "deployment created");
        Ok(created.into())
    }

    pub fn get_deployment(
        &self,
        principal: UserId,
        id: DeploymentId,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.store
            .read_cluster(cluster_id, |shard| shard.deployment(id).map(DeploymentView::from))
            .flatten()
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))
    }

    /// List deployments, optionally restricted to one cluster
    pub fn list_deployments(
        &self,
        principal: UserId,
        cluster_id: Option<ClusterId>,
    ) -> Result<Vec<DeploymentView>, ApiError> {
        self.require_user(principal)?;
        let deployments = match cluster_id {
            Some(cluster_id) => self.store.cluster_deployments(cluster_id),
            None => self.store.all_deployments(),
        };
        Ok(deployments.iter().map(DeploymentView::from).collect())
    }

    pub fn update_deployment(
        &self,
        principal: UserId,
        id: DeploymentId,
        patch: DeploymentUpdate,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        patch.validate()?;
        let cluster_id = self.locate_deployment(id)?;
        self.authorize_cluster(principal, cluster_id)?;

        let op = UpdateOp {
            name: patch.name,
            image_ref: patch.docker_image,
            required_ram: patch.required_ram,
            required_cpu: patch.required_cpu,
            required_gpu: patch.required_gpu,
            priority: patch.priority,
            status: patch.status,
            dependency_ids: patch.dependency_ids,
        };
        let now = Utc::now();

        let updated = self
            .store
            .mutate_cluster(cluster_id, |shard| admission::update(shard, id, op, now))
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))?
            .map_err(map_admission_error)?;
        Ok(updated.into())
    }

    /// `POST /deployments/{id}/start`
    pub fn start_deployment(
        &self,
        principal: UserId,
        id: DeploymentId,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.authorize_cluster(principal, cluster_id)?;

        let now = Utc::now();
        self.store
            .mutate_cluster(cluster_id, |shard| admission::start(shard, id, now))
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))?
            .map(DeploymentView::from)
            .ok_or_else(|| {
                ApiError::StateConflict(
                    "deployment cannot be started: it must be pending, with every dependency \
                     completed and sufficient free capacity"
                        .to_string(),
                )
            })
    }

    /// `POST /deployments/{id}/stop?status=completed|failed`
    pub fn stop_deployment(
        &self,
        principal: UserId,
        id: DeploymentId,
        outcome: StopStatus,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.authorize_cluster(principal, cluster_id)?;

        let stopped = self
            .store
            .mutate_cluster(cluster_id, |shard| admission::stop(shard, id, outcome))
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))?
            .ok_or_else(|| {
                ApiError::StateConflict("only running deployments can be stopped".to_string())
            })?;

        // The stop transaction has committed; now walk the cascade, one
        // fresh transaction per dependent.
        self.run_cascade(cluster_id, &stopped.cascade);

        Ok(stopped.deployment.into())
    }

    /// `POST /deployments/{id}/cancel`
    pub fn cancel_deployment(
        &self,
        principal: UserId,
        id: DeploymentId,
    ) -> Result<DeploymentView, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.authorize_cluster(principal, cluster_id)?;

        self.store
            .mutate_cluster(cluster_id, |shard| admission::cancel(shard, id))
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))?
            .map(DeploymentView::from)
            .ok_or_else(|| {
                ApiError::StateConflict("only pending deployments can be cancelled".to_string())
            })
    }

    pub fn delete_deployment(&self, principal: UserId, id: DeploymentId) -> Result<(), ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.authorize_cluster(principal, cluster_id)?;

        let removed = self
            .store
            .mutate_cluster(cluster_id, |shard| admission::delete(shard, id))
            .unwrap_or(false);
        if !removed {
            return Err(ApiError::NotFound(format!("deployment {} not found", id)));
        }
        self.store.unregister_deployment(id);
        Ok(())
    }

    /// `GET /deployments/{id}/dependencies`
    pub fn deployment_dependencies(
        &self,
        principal: UserId,
        id: DeploymentId,
    ) -> Result<Vec<DeploymentView>, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.store
            .read_cluster(cluster_id, |shard| {
                shard
                    .graph
                    .dependencies(id)
                    .into_iter()
                    .filter_map(|dep| shard.deployment(dep).map(DeploymentView::from))
                    .collect()
            })
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))
    }

    /// `GET /deployments/{id}/dependents`
    pub fn deployment_dependents(
        &self,
        principal: UserId,
        id: DeploymentId,
    ) -> Result<Vec<DeploymentView>, ApiError> {
        self.require_user(principal)?;
        let cluster_id = self.locate_deployment(id)?;
        self.store
            .read_cluster(cluster_id, |shard| {
                shard
                    .graph
                    .dependents(id)
                    .into_iter()
                    .filter_map(|dep| shard.deployment(dep).map(DeploymentView::from))
                    .collect()
            })
            .ok_or_else(|| ApiError::NotFound(format!("deployment {} not found", id)))
    }

    /// Attempt `start` for each dependent reported by a completing stop
    fn run_cascade(&self, cluster_id: ClusterId, dependents: &[DeploymentId]) {
        let now = Utc::now();
        for &dependent in dependents {
            match self
                .store
                .mutate_cluster(cluster_id, |shard| admission::start(shard, dependent, now))
            {
                Some(Some(_)) => {
                    info!(deployment = dependent, "started by completion cascade");
                }
                Some(None) => {
                    // Still gated or out of capacity: the scheduler tick
                    // retries it
                    debug!(deployment = dependent, "cascade start deferred");
                }
                None => break, // cluster vanished mid-walk
            }
        }
    }

    // ========================================================================
    // Clusters
    // ========================================================================

    pub fn create_cluster(
        &self,
        principal: UserId,
        req: ClusterCreate,
    ) -> Result<ClusterView, ApiError> {
        self.require_user(principal)?;
        req.validate()?;
        let org = self
            .store
            .organization(req.organization_id)
            .ok_or_else(|| {
                ApiError::NotFound(format!("organization {} not found", req.organization_id))
            })?;
        self.require_member(principal, org.id())?;

        let cluster = self.store.create_cluster(
            org.id(),
            req.name,
            Resources::new(req.total_ram, req.total_cpu, req.total_gpu),
            principal,
            Utc::now(),
        );
        info!(cluster = cluster.id(), organization = org.id(), "cluster created");
        Ok(cluster.into())
    }

    pub fn get_cluster(&self, principal: UserId, id: ClusterId) -> Result<ClusterView, ApiError> {
        self.require_user(principal)?;
        self.store
            .read_cluster(id, |shard| ClusterView::from(&shard.cluster))
            .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", id)))
    }

    pub fn list_clusters(&self, principal: UserId) -> Result<Vec<ClusterView>, ApiError> {
        self.require_user(principal)?;
        Ok(self.store.clusters().iter().map(ClusterView::from).collect())
    }

    /// Apply a cluster patch; capacity growth raises `available` by the same
    /// delta, and a shrink below current running demand is rejected
    pub fn update_cluster(
        &self,
        principal: UserId,
        id: ClusterId,
        patch: ClusterUpdate,
    ) -> Result<ClusterView, ApiError> {
        self.require_user(principal)?;
        patch.validate()?;
        self.authorize_cluster(principal, id)?;

        self.store
            .mutate_cluster(id, |shard| {
                if let Some(name) = patch.name {
                    shard.cluster.set_name(name);
                }
                let current = shard.cluster.total();
                let new_total = Resources::new(
                    patch.total_ram.unwrap_or(current.ram),
                    patch.total_cpu.unwrap_or(current.cpu),
                    patch.total_gpu.unwrap_or(current.gpu),
                );
                if new_total != current {
                    shard
                        .cluster
                        .set_total(new_total)
                        .map_err(|err| ApiError::StateConflict(err.to_string()))?;
                }
                Ok(ClusterView::from(&shard.cluster))
            })
            .ok_or_else(|| ApiError::NotFound(format!("cluster {} not found", id)))?
    }

    pub fn delete_cluster(&self, principal: UserId, id: ClusterId) -> Result<(), ApiError> {
        self.require_user(principal)?;
        self.authorize_cluster(principal, id)?;
        if self.store.remove_cluster(id) {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("cluster {} not found", id)))
        }
    }
}

/// Translate state-machine errors into the API error kinds
fn map_admission_error(err: AdmissionError) -> ApiError {
    match err {
        AdmissionError::DeploymentNotFound(_) => ApiError::NotFound(err.to_string()),
        AdmissionError::DependencyNotFound(_)
        | AdmissionError::SelfDependency
        | AdmissionError::DependencyCycle
        | AdmissionError::InvalidResources(_) => ApiError::Validation(err.to_string()),
        AdmissionError::TerminalStatusPatch(_) => ApiError::StateConflict(err.to_string()),
    }
}
