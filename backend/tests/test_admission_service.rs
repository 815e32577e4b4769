//! Admission Service Tests
//!
//! Authorization, DTO validation, error-to-status mapping, cluster capacity
//! updates and ownership cascades, exercised through the API-facing facade.

use chrono::Utc;
use deployment_hypervisor_core::admission::StopStatus;
use deployment_hypervisor_core::error::ApiError;
use deployment_hypervisor_core::models::{
    ClusterId, DeploymentPriority, DeploymentStatus, OrganizationId, UserId,
};
use deployment_hypervisor_core::service::{
    AdmissionService, ClusterCreate, ClusterUpdate, DeploymentCreate, DeploymentUpdate,
};
use deployment_hypervisor_core::store::Store;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    store: Arc<Store>,
    service: AdmissionService,
    member: UserId,
    outsider: UserId,
    org: OrganizationId,
    cluster: ClusterId,
}

fn harness() -> Harness {
    let store = Arc::new(Store::new());
    let service = AdmissionService::new(Arc::clone(&store));
    let now = Utc::now();
    let member = store.add_user("alice".to_string(), now);
    let outsider = store.add_user("mallory".to_string(), now);
    let org = store.add_organization("acme".to_string(), member.id(), now);
    let cluster = service
        .create_cluster(
            member.id(),
            ClusterCreate {
                name: "main".to_string(),
                total_ram: 8.0,
                total_cpu: 4.0,
                total_gpu: 1.0,
                organization_id: org.id(),
            },
        )
        .unwrap();
    Harness {
        store,
        service,
        member: member.id(),
        outsider: outsider.id(),
        org: org.id(),
        cluster: cluster.id,
    }
}

fn deployment_body(cluster: ClusterId) -> DeploymentCreate {
    DeploymentCreate {
        name: "worker".to_string(),
        docker_image: "registry/worker:latest".to_string(),
        required_ram: 1.0,
        required_cpu: 1.0,
        required_gpu: 0.0,
        priority: DeploymentPriority::Medium,
        cluster_id: cluster,
        dependency_ids: Vec::new(),
    }
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn test_unknown_principal_is_unauthorized() {
    let h = harness();
    let err = h
        .service
        .create_deployment(9999, deployment_body(h.cluster))
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert_eq!(err.http_status(), 401);
}

#[test]
fn test_non_member_is_forbidden() {
    let h = harness();
    let err = h
        .service
        .create_deployment(h.outsider, deployment_body(h.cluster))
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    assert_eq!(err.http_status(), 403);

    // Mutations on existing deployments are guarded the same way
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;
    let err = h.service.start_deployment(h.outsider, id).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
    let err = h.service.delete_deployment(h.outsider, id).unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[test]
fn test_joining_by_invite_grants_access() {
    let h = harness();
    let code = h.store.organization(h.org).unwrap().invite_code().to_string();
    h.store.join_organization(h.outsider, &code).unwrap();

    assert!(h.service.create_deployment(h.outsider, deployment_body(h.cluster)).is_ok());
}

#[test]
fn test_cluster_create_requires_membership() {
    let h = harness();
    let err = h
        .service
        .create_cluster(
            h.outsider,
            ClusterCreate {
                name: "rogue".to_string(),
                total_ram: 1.0,
                total_cpu: 1.0,
                total_gpu: 0.0,
                organization_id: h.org,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

// ============================================================================
// Not-found and validation mapping
// ============================================================================

#[test]
fn test_missing_entities_map_to_404() {
    let h = harness();

    let err = h.service.get_deployment(h.member, 424242).unwrap_err();
    assert_eq!(err.http_status(), 404);

    let err = h.service.get_cluster(h.member, 424242).unwrap_err();
    assert_eq!(err.http_status(), 404);

    let err = h
        .service
        .create_deployment(h.member, deployment_body(424242))
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = h
        .service
        .create_cluster(
            h.member,
            ClusterCreate {
                name: "x".to_string(),
                total_ram: 1.0,
                total_cpu: 1.0,
                total_gpu: 0.0,
                organization_id: 424242,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[test]
fn test_schema_violations_map_to_400() {
    let h = harness();

    let mut body = deployment_body(h.cluster);
    body.required_ram = 0.0;
    let err = h.service.create_deployment(h.member, body).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(err.http_status(), 400);

    let mut body = deployment_body(h.cluster);
    body.required_gpu = -1.0;
    let err = h.service.create_deployment(h.member, body).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = h
        .service
        .update_deployment(
            h.member,
            h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id,
            DeploymentUpdate {
                required_cpu: Some(-2.0),
                ..DeploymentUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[test]
fn test_lifecycle_refusals_map_to_400() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    // stop before start
    let err = h
        .service
        .stop_deployment(h.member, id, StopStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
    assert_eq!(err.http_status(), 400);

    h.service.start_deployment(h.member, id).unwrap();

    // start again, cancel while running
    let err = h.service.start_deployment(h.member, id).unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
    let err = h.service.cancel_deployment(h.member, id).unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));

    // direct terminal patch
    let err = h
        .service
        .update_deployment(
            h.member,
            id,
            DeploymentUpdate {
                status: Some(DeploymentStatus::Completed),
                ..DeploymentUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));
}

// ============================================================================
// Lifecycle round trips through the service
// ============================================================================

#[test]
fn test_start_stop_round_trip() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    let started = h.service.start_deployment(h.member, id).unwrap();
    assert_eq!(started.status, DeploymentStatus::Running);
    assert!(started.started_at.is_some());

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(cluster.available_ram, 7.0);
    assert_eq!(cluster.available_cpu, 3.0);
    assert_eq!(cluster.available_gpu, 1.0);

    let stopped = h.service.stop_deployment(h.member, id, StopStatus::Completed).unwrap();
    assert_eq!(stopped.status, DeploymentStatus::Completed);

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(
        (cluster.available_ram, cluster.available_cpu, cluster.available_gpu),
        (8.0, 4.0, 1.0),
        "stop must restore the ledger exactly"
    );
}

#[test]
fn test_stop_default_outcome_is_completed() {
    assert_eq!(StopStatus::default(), StopStatus::Completed);
}

#[test]
fn test_status_patch_through_update_runs_the_state_machine() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    let updated = h
        .service
        .update_deployment(
            h.member,
            id,
            DeploymentUpdate {
                status: Some(DeploymentStatus::Running),
                ..DeploymentUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, DeploymentStatus::Running);

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(cluster.available_ram, 7.0, "the patch went through allocate");

    let updated = h
        .service
        .update_deployment(
            h.member,
            id,
            DeploymentUpdate {
                status: Some(DeploymentStatus::Pending),
                ..DeploymentUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.status, DeploymentStatus::Pending);

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(cluster.available_ram, 8.0, "and back through release");
}

#[test]
fn test_delete_running_deployment_restores_ledger() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;
    h.service.start_deployment(h.member, id).unwrap();

    h.service.delete_deployment(h.member, id).unwrap();

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(cluster.available_ram, 8.0);
    assert_eq!(h.service.get_deployment(h.member, id).unwrap_err().http_status(), 404);
}

// ============================================================================
// Cluster capacity updates
// ============================================================================

#[test]
fn test_capacity_growth_raises_available_by_delta() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;
    h.service.start_deployment(h.member, id).unwrap();

    let updated = h
        .service
        .update_cluster(
            h.member,
            h.cluster,
            ClusterUpdate {
                total_ram: Some(12.0),
                ..ClusterUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.total_ram, 12.0);
    assert_eq!(updated.available_ram, 11.0, "grow by 4 ⇒ available grows by 4");
    assert_eq!(updated.available_cpu, 3.0, "untouched axes keep their claims");
}

#[test]
fn test_capacity_shrink_below_running_demand_is_rejected() {
    let h = harness();
    let mut body = deployment_body(h.cluster);
    body.required_ram = 6.0;
    let id = h.service.create_deployment(h.member, body).unwrap().id;
    h.service.start_deployment(h.member, id).unwrap();

    let err = h
        .service
        .update_cluster(
            h.member,
            h.cluster,
            ClusterUpdate {
                total_ram: Some(4.0),
                ..ClusterUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::StateConflict(_)));

    let cluster = h.service.get_cluster(h.member, h.cluster).unwrap();
    assert_eq!(cluster.total_ram, 8.0, "rejected update must not apply");
}

#[test]
fn test_capacity_shrink_above_running_demand_is_applied() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;
    h.service.start_deployment(h.member, id).unwrap();

    let updated = h
        .service
        .update_cluster(
            h.member,
            h.cluster,
            ClusterUpdate {
                total_ram: Some(2.0),
                ..ClusterUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.total_ram, 2.0);
    assert_eq!(updated.available_ram, 1.0, "1 GB stays claimed by the running deployment");
}

#[test]
fn test_cluster_rename() {
    let h = harness();
    let updated = h
        .service
        .update_cluster(
            h.member,
            h.cluster,
            ClusterUpdate {
                name: Some("renamed".to_string()),
                ..ClusterUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "renamed");
}

// ============================================================================
// Ownership cascades
// ============================================================================

#[test]
fn test_delete_cluster_removes_its_deployments() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    h.service.delete_cluster(h.member, h.cluster).unwrap();

    assert_eq!(h.service.get_deployment(h.member, id).unwrap_err().http_status(), 404);
    assert_eq!(h.service.get_cluster(h.member, h.cluster).unwrap_err().http_status(), 404);
}

#[test]
fn test_delete_organization_removes_clusters_and_deployments() {
    let h = harness();
    let id = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    assert!(h.store.delete_organization(h.org));

    assert_eq!(h.service.get_cluster(h.member, h.cluster).unwrap_err().http_status(), 404);
    assert_eq!(h.service.get_deployment(h.member, id).unwrap_err().http_status(), 404);
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_listing_by_cluster() {
    let h = harness();
    let a = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;
    let b = h.service.create_deployment(h.member, deployment_body(h.cluster)).unwrap().id;

    let all = h.service.list_deployments(h.member, None).unwrap();
    assert_eq!(all.len(), 2);

    let mut ids: Vec<_> = h
        .service
        .list_deployments(h.member, Some(h.cluster))
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![a, b]);

    assert!(h.service.list_deployments(h.member, Some(424242)).unwrap().is_empty());
}
