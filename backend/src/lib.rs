//! Deployment Hypervisor Core
//!
//! Multi-tenant admission, dependency and preemption engine: places
//! containerized jobs onto clusters of fixed RAM/CPU/GPU capacity.
//!
//! # Architecture
//!
//! - **models**: Domain types (Cluster, Deployment, Organization, Resources)
//! - **graph**: Dependency DAG with cycle rejection
//! - **store**: Transactional in-memory entity store with per-cluster locks
//! - **admission**: Deployment state machine (create/update/start/stop/cancel/delete)
//! - **service**: API-facing admission service (authz, DTOs, error mapping)
//! - **scheduler**: Periodic sweep (greedy admission + priority preemption)
//! - **supervisor**: Process-level ownership of store, service and worker
//!
//! # Critical Invariants
//!
//! 1. Per cluster, `available = total − Σ required` over RUNNING deployments
//! 2. The dependency relation is an acyclic same-cluster DAG
//! 3. Terminal statuses (COMPLETED, FAILED, CANCELLED) are sinks
//! 4. All RUNNING-affecting operations on one cluster are totally ordered
//!    by its shard lock

// Module declarations
pub mod admission;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod supervisor;

// Re-exports for convenience
pub use admission::{AdmissionError, StopStatus};
pub use config::Config;
pub use error::ApiError;
pub use graph::DependencyGraph;
pub use models::{
    Cluster, Deployment, DeploymentPriority, DeploymentStatus, Organization, Resources, User,
};
pub use scheduler::{Scheduler, SchedulerWorker, TickReport};
pub use service::AdmissionService;
pub use store::Store;
pub use supervisor::Supervisor;
