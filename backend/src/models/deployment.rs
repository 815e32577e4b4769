//! Deployment model
//!
//! A deployment is a unit of scheduled work bound to one cluster. It carries:
//! - A container image reference and a fixed resource footprint
//! - A priority level (LOW=1, MEDIUM=2, HIGH=3)
//! - A status following the five-state lifecycle
//! - Optional dependency edges, stored in the cluster's dependency graph
//!
//! # Lifecycle
//!
//! ```text
//!         create               start
//!  (none) ────▶ PENDING ─────────────▶ RUNNING
//!                │                      │
//!                │ cancel               │ stop
//!                ▼                      ▼
//!             CANCELLED        COMPLETED or FAILED
//! ```
//!
//! COMPLETED, FAILED and CANCELLED are sinks: once entered, only deletion
//! removes the record.

use crate::models::resources::Resources;
use crate::models::{ClusterId, DeploymentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment status
///
/// Serializes as a lowercase string (`"pending"`, `"running"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Waiting for admission
    Pending,

    /// Holding resources on its cluster
    Running,

    /// Finished successfully; unblocks dependents
    Completed,

    /// Finished unsuccessfully (includes preemption victims)
    Failed,

    /// Withdrawn before it ever ran
    Cancelled,
}

impl DeploymentStatus {
    /// True for COMPLETED, FAILED and CANCELLED
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }
}

/// Deployment priority
///
/// Serializes as its integer value (1, 2 or 3). Ordering follows the value,
/// so `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeploymentPriority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl DeploymentPriority {
    /// Numeric priority value (LOW=1, MEDIUM=2, HIGH=3)
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for DeploymentPriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DeploymentPriority::Low),
            2 => Ok(DeploymentPriority::Medium),
            3 => Ok(DeploymentPriority::High),
            other => Err(format!("priority must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl From<DeploymentPriority> for u8 {
    fn from(priority: DeploymentPriority) -> u8 {
        priority.value()
    }
}

/// A unit of scheduled work bound to one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment identifier
    id: DeploymentId,

    /// Hosting cluster (fixed at create time; no cross-cluster placement)
    cluster_id: ClusterId,

    /// Creating user (authorization back-reference only)
    user_id: UserId,

    /// Display name
    name: String,

    /// Container image reference
    image_ref: String,

    /// Resource footprint claimed while RUNNING
    required: Resources,

    /// Scheduling priority
    priority: DeploymentPriority,

    /// Current lifecycle state
    status: DeploymentStatus,

    /// Creation timestamp (UTC)
    created_at: DateTime<Utc>,

    /// Set on every transition into RUNNING; non-null iff the deployment has
    /// ever run
    started_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Create a PENDING deployment
    pub fn new(
        id: DeploymentId,
        cluster_id: ClusterId,
        user_id: UserId,
        name: String,
        image_ref: String,
        required: Resources,
        priority: DeploymentPriority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            cluster_id,
            user_id,
            name,
            image_ref,
            required,
            priority,
            status: DeploymentStatus::Pending,
            created_at,
            started_at: None,
        }
    }

    pub fn id(&self) -> DeploymentId {
        self.id
    }

    pub fn cluster_id(&self) -> ClusterId {
        self.cluster_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    pub fn required(&self) -> Resources {
        self.required
    }

    pub fn priority(&self) -> DeploymentPriority {
        self.priority
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeploymentStatus::Pending
    }

    pub fn is_running(&self) -> bool {
        self.status == DeploymentStatus::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_image_ref(&mut self, image_ref: String) {
        self.image_ref = image_ref;
    }

    pub fn set_priority(&mut self, priority: DeploymentPriority) {
        self.priority = priority;
    }

    /// Overwrite the resource footprint
    ///
    /// The caller owns the ledger consequences: a RUNNING deployment's old
    /// footprint must be released and the new one allocated in the same
    /// transaction.
    pub fn set_required(&mut self, required: Resources) {
        self.required = required;
    }

    /// Enter RUNNING and stamp `started_at`
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = DeploymentStatus::Running;
        self.started_at = Some(now);
    }

    /// Leave RUNNING for PENDING (honoured status patch); `started_at` is
    /// kept, it records that the deployment has run
    pub fn mark_pending(&mut self) {
        self.status = DeploymentStatus::Pending;
    }

    /// Enter COMPLETED or FAILED
    pub fn mark_stopped(&mut self, terminal: DeploymentStatus) {
        debug_assert!(
            matches!(terminal, DeploymentStatus::Completed | DeploymentStatus::Failed),
            "stop targets COMPLETED or FAILED only"
        );
        self.status = terminal;
    }

    /// Enter CANCELLED
    pub fn mark_cancelled(&mut self) {
        self.status = DeploymentStatus::Cancelled;
    }
}
