//! Cluster model and resource ledger
//!
//! A cluster is a fixed-capacity resource pool owned by one organization.
//! The ledger primitives `check`/`allocate`/`release` live here: `available`
//! is always `total` minus the footprints of the cluster's RUNNING
//! deployments, and every mutation happens under the cluster's exclusive
//! store lock so concurrent allocations linearize.
//!
//! # Critical Invariants
//!
//! 1. `0 ≤ available_X ≤ total_X` for X ∈ {ram, cpu, gpu}
//! 2. `available_X = total_X − Σ required_X` over RUNNING deployments
//! 3. `release` never fails; it clamps to `total` to re-assert invariant 2

use crate::models::resources::Resources;
use crate::models::{ClusterId, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by cluster capacity updates
#[derive(Debug, Error, PartialEq)]
pub enum CapacityError {
    #[error("cannot shrink {axis} below current running demand (in use {in_use}, new total {new_total})")]
    BelowRunningDemand {
        axis: &'static str,
        in_use: f64,
        new_total: f64,
    },
}

/// A named resource pool owned by one organization
///
/// # Example
/// ```
/// use deployment_hypervisor_core::models::{Cluster, Resources};
/// use chrono::Utc;
///
/// let mut cluster = Cluster::new(1, 1, "gpu-lab".to_string(), Resources::new(8.0, 4.0, 1.0), 1, Utc::now());
/// assert!(cluster.allocate(&Resources::new(1.0, 1.0, 0.0)));
/// assert_eq!(cluster.available(), Resources::new(7.0, 3.0, 1.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique cluster identifier
    id: ClusterId,

    /// Owning organization
    organization_id: OrganizationId,

    /// Display name
    name: String,

    /// Fixed capacity
    total: Resources,

    /// Capacity not claimed by RUNNING deployments
    available: Resources,

    /// User that created the cluster (authorization back-reference only)
    creator_id: UserId,

    /// Creation timestamp (UTC)
    created_at: DateTime<Utc>,
}

impl Cluster {
    /// Create a cluster with `available` initialized to the full capacity
    pub fn new(
        id: ClusterId,
        organization_id: OrganizationId,
        name: String,
        total: Resources,
        creator_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            organization_id,
            name,
            total,
            available: total,
            creator_id,
            created_at,
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> Resources {
        self.total
    }

    pub fn available(&self) -> Resources {
        self.available
    }

    pub fn creator_id(&self) -> UserId {
        self.creator_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Capacity currently claimed by RUNNING deployments
    pub fn in_use(&self) -> Resources {
        self.total - self.available
    }

    // ========================================================================
    // Ledger primitives
    // ========================================================================

    /// True iff `required` fits within the available capacity on every axis
    pub fn check(&self, required: &Resources) -> bool {
        self.available.covers(required)
    }

    /// Claim `required` from the available capacity
    ///
    /// Returns false and leaves the ledger untouched when any axis would go
    /// negative.
    pub fn allocate(&mut self, required: &Resources) -> bool {
        if !self.check(required) {
            return false;
        }
        self.available = self.available - *required;
        true
    }

    /// Return `released` to the available capacity
    ///
    /// Never fails. Each axis is clamped to `total` so that capacity updates
    /// and manual state repair cannot push the ledger above its ceiling.
    pub fn release(&mut self, released: &Resources) {
        self.available = (self.available + *released).clamped_to(&self.total);
    }

    /// Apply a capacity update
    ///
    /// Growth on an axis raises `available` by the same delta. Shrinkage is
    /// accepted only while the new total still covers the running demand on
    /// that axis; `available` shrinks by the delta so the conservation
    /// invariant holds at the transaction boundary.
    pub fn set_total(&mut self, new_total: Resources) -> Result<(), CapacityError> {
        let in_use = self.in_use();
        if new_total.ram < in_use.ram {
            return Err(CapacityError::BelowRunningDemand {
                axis: "ram",
                in_use: in_use.ram,
                new_total: new_total.ram,
            });
        }
        if new_total.cpu < in_use.cpu {
            return Err(CapacityError::BelowRunningDemand {
                axis: "cpu",
                in_use: in_use.cpu,
                new_total: new_total.cpu,
            });
        }
        if new_total.gpu < in_use.gpu {
            return Err(CapacityError::BelowRunningDemand {
                axis: "gpu",
                in_use: in_use.gpu,
                new_total: new_total.gpu,
            });
        }

        self.total = new_total;
        self.available = new_total - in_use;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(total: Resources) -> Cluster {
        Cluster::new(1, 1, "test".to_string(), total, 1, Utc::now())
    }

    #[test]
    fn test_allocate_exact_fit_succeeds() {
        let mut c = cluster(Resources::new(2.0, 2.0, 0.0));

        assert!(c.allocate(&Resources::new(2.0, 2.0, 0.0)));
        assert_eq!(c.available(), Resources::zero());
    }

    #[test]
    fn test_allocate_over_any_axis_is_a_noop() {
        let mut c = cluster(Resources::new(2.0, 2.0, 0.0));

        assert!(!c.allocate(&Resources::new(2.5, 1.0, 0.0)));
        assert!(!c.allocate(&Resources::new(1.0, 1.0, 0.5)));
        assert_eq!(c.available(), c.total(), "failed allocate must not move the ledger");
    }

    #[test]
    fn test_release_clamps_to_total() {
        let mut c = cluster(Resources::new(4.0, 4.0, 1.0));
        assert!(c.allocate(&Resources::new(1.0, 1.0, 0.0)));

        // Over-release (state repair path): absorbed by the clamp
        c.release(&Resources::new(10.0, 10.0, 10.0));
        assert_eq!(c.available(), c.total());
    }

    #[test]
    fn test_grow_raises_available_by_delta() {
        let mut c = cluster(Resources::new(4.0, 4.0, 0.0));
        assert!(c.allocate(&Resources::new(3.0, 1.0, 0.0)));

        c.set_total(Resources::new(6.0, 4.0, 1.0)).unwrap();
        assert_eq!(c.available(), Resources::new(3.0, 3.0, 1.0));
    }

    #[test]
    fn test_shrink_below_running_demand_is_rejected() {
        let mut c = cluster(Resources::new(4.0, 4.0, 0.0));
        assert!(c.allocate(&Resources::new(3.0, 1.0, 0.0)));

        let err = c.set_total(Resources::new(2.0, 4.0, 0.0)).unwrap_err();
        assert!(matches!(err, CapacityError::BelowRunningDemand { axis: "ram", .. }));
        assert_eq!(c.total(), Resources::new(4.0, 4.0, 0.0), "rejected update must not apply");
    }

    #[test]
    fn test_shrink_above_running_demand_reasserts_conservation() {
        let mut c = cluster(Resources::new(4.0, 4.0, 0.0));
        assert!(c.allocate(&Resources::new(1.0, 1.0, 0.0)));

        c.set_total(Resources::new(2.0, 2.0, 0.0)).unwrap();
        assert_eq!(c.available(), Resources::new(1.0, 1.0, 0.0));
    }
}
