//! Transactional in-memory store
//!
//! The persisted entity set behind the admission service and the scheduler:
//! a registry (users, organizations, membership pairs), one shard per
//! cluster, and a directory relation mapping deployments to their cluster.
//! The persistence *technology* is an external collaborator; this module is
//! the transactional interface the core needs from it.
//!
//! # Concurrency discipline
//!
//! - `mutate_cluster` takes the cluster shard's exclusive lock for the whole
//!   closure: this is the row-level guard of the design, so all
//!   RUNNING-affecting operations on one cluster are totally ordered.
//! - Reads take shared locks and may proceed concurrently.
//! - Operations never hold two shard locks; cross-cluster work is
//!   independent and may reorder.
//! - Lock order is registry → shard map → shard → directory. Never acquire
//!   against that order.
//!
//! A directory entry can briefly outlive its cluster when a deployment
//! create races a cluster delete; resolution always re-validates against the
//! shard map and treats the stale entry as absent.

use crate::graph::DependencyGraph;
use crate::models::{
    Cluster, ClusterId, Deployment, DeploymentId, DeploymentStatus, Organization, OrganizationId,
    Resources, User, UserId,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};

/// One cluster's slice of the entity set
///
/// Holds the cluster row (with its ledger), the cluster's deployments and
/// their dependency edges. Everything an admission operation touches lives in
/// exactly one shard, which is what makes the per-cluster lock sufficient.
#[derive(Debug)]
pub struct ClusterShard {
    pub cluster: Cluster,
    pub deployments: BTreeMap<DeploymentId, Deployment>,
    pub graph: DependencyGraph,
}

impl ClusterShard {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            deployments: BTreeMap::new(),
            graph: DependencyGraph::new(),
        }
    }

    pub fn deployment(&self, id: DeploymentId) -> Option<&Deployment> {
        self.deployments.get(&id)
    }

    /// Pending deployments in admission order: priority descending, then
    /// creation time ascending, then id ascending as the final tiebreak
    pub fn pending_in_admission_order(&self) -> Vec<DeploymentId> {
        let mut pending: Vec<&Deployment> = self
            .deployments
            .values()
            .filter(|d| d.is_pending())
            .collect();
        pending.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_at().cmp(&b.created_at()))
                .then(a.id().cmp(&b.id()))
        });
        pending.into_iter().map(|d| d.id()).collect()
    }

    /// Running deployments with priority strictly below `ceiling_value`,
    /// oldest lowest-priority first (preemption victim order)
    pub fn preemption_candidates(&self, ceiling_value: u8) -> Vec<DeploymentId> {
        let mut running: Vec<&Deployment> = self
            .deployments
            .values()
            .filter(|d| d.status() == DeploymentStatus::Running && d.priority().value() < ceiling_value)
            .collect();
        running.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then(a.started_at().cmp(&b.started_at()))
                .then(a.id().cmp(&b.id()))
        });
        running.into_iter().map(|d| d.id()).collect()
    }
}

#[derive(Debug, Default)]
struct Registry {
    organizations: BTreeMap<OrganizationId, Organization>,
    users: BTreeMap<UserId, User>,
    memberships: BTreeSet<(UserId, OrganizationId)>,
}

/// The shared entity store
///
/// Identifiers for every entity kind are issued from one monotonic counter.
#[derive(Debug)]
pub struct Store {
    registry: RwLock<Registry>,
    shards: RwLock<BTreeMap<ClusterId, RwLock<ClusterShard>>>,
    directory: RwLock<BTreeMap<DeploymentId, ClusterId>>,
    next_id: AtomicI64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            shards: RwLock::new(BTreeMap::new()),
            directory: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Issue the next entity identifier
    pub fn issue_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // Registry: users, organizations, memberships
    // ========================================================================

    pub fn add_user(&self, username: String, now: DateTime<Utc>) -> User {
        let user = User::new(self.issue_id(), username, now);
        self.registry.write().users.insert(user.id(), user.clone());
        user
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.registry.read().users.get(&id).cloned()
    }

    /// Create an organization with a unique invite code and enroll the
    /// creator as its first member
    pub fn add_organization(
        &self,
        name: String,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Organization {
        let mut registry = self.registry.write();
        let mut org = Organization::new(self.issue_id(), name, now);
        while registry
            .organizations
            .values()
            .any(|o| o.invite_code() == org.invite_code())
        {
            org.set_invite_code(Organization::generate_invite_code());
        }
        registry.organizations.insert(org.id(), org.clone());
        registry.memberships.insert((creator_id, org.id()));
        org
    }

    pub fn organization(&self, id: OrganizationId) -> Option<Organization> {
        self.registry.read().organizations.get(&id).cloned()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.registry.read().organizations.values().cloned().collect()
    }

    pub fn add_membership(&self, user_id: UserId, org_id: OrganizationId) {
        self.registry.write().memberships.insert((user_id, org_id));
    }

    /// The authorization predicate: is `user_id` a member of `org_id`?
    pub fn is_member(&self, user_id: UserId, org_id: OrganizationId) -> bool {
        self.registry.read().memberships.contains(&(user_id, org_id))
    }

    /// Enroll a user into the organization matching `invite_code`
    pub fn join_organization(&self, user_id: UserId, invite_code: &str) -> Option<Organization> {
        let mut registry = self.registry.write();
        if !registry.users.contains_key(&user_id) {
            return None;
        }
        let org = registry
            .organizations
            .values()
            .find(|o| o.invite_code() == invite_code)?
            .clone();
        registry.memberships.insert((user_id, org.id()));
        Some(org)
    }

    /// Replace an organization's invite code, invalidating the old one
    pub fn regenerate_invite_code(&self, org_id: OrganizationId) -> Option<Organization> {
        let mut registry = self.registry.write();
        let mut code = Organization::generate_invite_code();
        while registry
            .organizations
            .values()
            .any(|o| o.id() != org_id && o.invite_code() == code)
        {
            code = Organization::generate_invite_code();
        }
        let org = registry.organizations.get_mut(&org_id)?;
        org.set_invite_code(code);
        Some(org.clone())
    }

    /// Delete an organization together with its clusters and their
    /// deployments (ownership cascade)
    pub fn delete_organization(&self, org_id: OrganizationId) -> bool {
        let mut registry = self.registry.write();
        if registry.organizations.remove(&org_id).is_none() {
            return false;
        }
        registry.memberships.retain(|&(_, o)| o != org_id);
        drop(registry);

        let owned: Vec<ClusterId> = {
            let shards = self.shards.read();
            shards
                .iter()
                .filter(|(_, shard)| shard.read().cluster.organization_id() == org_id)
                .map(|(&id, _)| id)
                .collect()
        };
        for cluster_id in owned {
            self.remove_cluster(cluster_id);
        }
        true
    }

    // ========================================================================
    // Clusters and shards
    // ========================================================================

    /// Create a cluster shard; `available` starts at the full capacity
    pub fn create_cluster(
        &self,
        organization_id: OrganizationId,
        name: String,
        total: Resources,
        creator_id: UserId,
        now: DateTime<Utc>,
    ) -> Cluster {
        let cluster = Cluster::new(self.issue_id(), organization_id, name, total, creator_id, now);
        self.shards
            .write()
            .insert(cluster.id(), RwLock::new(ClusterShard::new(cluster.clone())));
        cluster
    }

    /// Remove a cluster, its deployments and their edges
    pub fn remove_cluster(&self, cluster_id: ClusterId) -> bool {
        let removed = self.shards.write().remove(&cluster_id);
        if removed.is_none() {
            return false;
        }
        self.directory.write().retain(|_, c| *c != cluster_id);
        true
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.shards.read().keys().copied().collect()
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        self.shards
            .read()
            .values()
            .map(|shard| shard.read().cluster.clone())
            .collect()
    }

    pub fn organization_clusters(&self, org_id: OrganizationId) -> Vec<Cluster> {
        self.shards
            .read()
            .values()
            .map(|shard| shard.read().cluster.clone())
            .filter(|c| c.organization_id() == org_id)
            .collect()
    }

    /// Run `f` against a shared snapshot of the cluster's shard
    pub fn read_cluster<R>(&self, id: ClusterId, f: impl FnOnce(&ClusterShard) -> R) -> Option<R> {
        let shards = self.shards.read();
        let shard = shards.get(&id)?;
        let guard = shard.read();
        Some(f(&guard))
    }

    /// Run `f` under the cluster's exclusive lock (one transaction)
    ///
    /// Returns `None` when the cluster does not exist.
    pub fn mutate_cluster<R>(
        &self,
        id: ClusterId,
        f: impl FnOnce(&mut ClusterShard) -> R,
    ) -> Option<R> {
        let shards = self.shards.read();
        let shard = shards.get(&id)?;
        let mut guard = shard.write();
        Some(f(&mut guard))
    }

    // ========================================================================
    // Deployment directory
    // ========================================================================

    /// Resolve a deployment to its hosting cluster
    pub fn cluster_of(&self, deployment_id: DeploymentId) -> Option<ClusterId> {
        let cluster_id = *self.directory.read().get(&deployment_id)?;
        if self.shards.read().contains_key(&cluster_id) {
            Some(cluster_id)
        } else {
            None
        }
    }

    pub fn register_deployment(&self, deployment_id: DeploymentId, cluster_id: ClusterId) {
        self.directory.write().insert(deployment_id, cluster_id);
    }

    pub fn unregister_deployment(&self, deployment_id: DeploymentId) {
        self.directory.write().remove(&deployment_id);
    }

    // ========================================================================
    // Listing queries
    // ========================================================================

    pub fn all_deployments(&self) -> Vec<Deployment> {
        let mut out = Vec::new();
        for shard in self.shards.read().values() {
            out.extend(shard.read().deployments.values().cloned());
        }
        out.sort_by_key(|d| d.id());
        out
    }

    pub fn cluster_deployments(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.read_cluster(cluster_id, |shard| {
            shard.deployments.values().cloned().collect()
        })
        .unwrap_or_default()
    }

    pub fn user_deployments(&self, user_id: UserId) -> Vec<Deployment> {
        let mut out: Vec<Deployment> = self
            .all_deployments()
            .into_iter()
            .filter(|d| d.user_id() == user_id)
            .collect();
        out.sort_by_key(|d| d.id());
        out
    }

    /// Pending deployments of a cluster in admission order
    pub fn pending_deployments(&self, cluster_id: ClusterId) -> Vec<Deployment> {
        self.read_cluster(cluster_id, |shard| {
            shard
                .pending_in_admission_order()
                .into_iter()
                .filter_map(|id| shard.deployment(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}
