//! Request and response shapes
//!
//! The wire-facing translation layer between the external HTTP surface and
//! the internal operations. Field names follow the public API (`docker_image`
//! rather than the internal `image_ref`); statuses are lowercase strings and
//! priorities are the integers 1–3.

use crate::error::ApiError;
use crate::models::{
    Cluster, ClusterId, Deployment, DeploymentId, DeploymentPriority, DeploymentStatus,
    OrganizationId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_priority() -> DeploymentPriority {
    DeploymentPriority::Medium
}

/// Body of `POST /deployments/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentCreate {
    pub name: String,
    pub docker_image: String,
    pub required_ram: f64,
    pub required_cpu: f64,
    #[serde(default)]
    pub required_gpu: f64,
    #[serde(default = "default_priority")]
    pub priority: DeploymentPriority,
    pub cluster_id: ClusterId,
    #[serde(default)]
    pub dependency_ids: Vec<DeploymentId>,
}

impl DeploymentCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".to_string()));
        }
        if self.docker_image.trim().is_empty() {
            return Err(ApiError::Validation("docker_image must not be empty".to_string()));
        }
        validate_ram(self.required_ram)?;
        validate_cpu(self.required_cpu)?;
        validate_gpu(self.required_gpu)?;
        Ok(())
    }
}

/// Body of `PUT /deployments/{id}`; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_ram: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_gpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<DeploymentPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_ids: Option<Vec<DeploymentId>>,
}

impl DeploymentUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("name must not be empty".to_string()));
            }
        }
        if let Some(image) = &self.docker_image {
            if image.trim().is_empty() {
                return Err(ApiError::Validation("docker_image must not be empty".to_string()));
            }
        }
        if let Some(ram) = self.required_ram {
            validate_ram(ram)?;
        }
        if let Some(cpu) = self.required_cpu {
            validate_cpu(cpu)?;
        }
        if let Some(gpu) = self.required_gpu {
            validate_gpu(gpu)?;
        }
        Ok(())
    }
}

/// Body of `POST /clusters/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCreate {
    pub name: String,
    pub total_ram: f64,
    pub total_cpu: f64,
    #[serde(default)]
    pub total_gpu: f64,
    pub organization_id: OrganizationId,
}

impl ClusterCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".to_string()));
        }
        validate_ram(self.total_ram)?;
        validate_cpu(self.total_cpu)?;
        validate_gpu(self.total_gpu)?;
        Ok(())
    }
}

/// Body of `PUT /clusters/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ram: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gpu: Option<f64>,
}

impl ClusterUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("name must not be empty".to_string()));
            }
        }
        if let Some(ram) = self.total_ram {
            validate_ram(ram)?;
        }
        if let Some(cpu) = self.total_cpu {
            validate_cpu(cpu)?;
        }
        if let Some(gpu) = self.total_gpu {
            validate_gpu(gpu)?;
        }
        Ok(())
    }
}

fn validate_ram(value: f64) -> Result<(), ApiError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("ram must be strictly positive, got {}", value)))
    }
}

fn validate_cpu(value: f64) -> Result<(), ApiError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("cpu must be strictly positive, got {}", value)))
    }
}

fn validate_gpu(value: f64) -> Result<(), ApiError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("gpu must be non-negative, got {}", value)))
    }
}

/// Deployment representation returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub id: DeploymentId,
    pub name: String,
    pub docker_image: String,
    pub status: DeploymentStatus,
    pub priority: DeploymentPriority,
    pub required_ram: f64,
    pub required_cpu: f64,
    pub required_gpu: f64,
    pub cluster_id: ClusterId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl From<&Deployment> for DeploymentView {
    fn from(deployment: &Deployment) -> Self {
        let required = deployment.required();
        Self {
            id: deployment.id(),
            name: deployment.name().to_string(),
            docker_image: deployment.image_ref().to_string(),
            status: deployment.status(),
            priority: deployment.priority(),
            required_ram: required.ram,
            required_cpu: required.cpu,
            required_gpu: required.gpu,
            cluster_id: deployment.cluster_id(),
            user_id: deployment.user_id(),
            created_at: deployment.created_at(),
            started_at: deployment.started_at(),
        }
    }
}

impl From<Deployment> for DeploymentView {
    fn from(deployment: Deployment) -> Self {
        (&deployment).into()
    }
}

/// Cluster representation returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: ClusterId,
    pub name: String,
    pub total_ram: f64,
    pub total_cpu: f64,
    pub total_gpu: f64,
    pub available_ram: f64,
    pub available_cpu: f64,
    pub available_gpu: f64,
    pub organization_id: OrganizationId,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl From<&Cluster> for ClusterView {
    fn from(cluster: &Cluster) -> Self {
        let total = cluster.total();
        let available = cluster.available();
        Self {
            id: cluster.id(),
            name: cluster.name().to_string(),
            total_ram: total.ram,
            total_cpu: total.cpu,
            total_gpu: total.gpu,
            available_ram: available.ram,
            available_cpu: available.cpu,
            available_gpu: available.gpu,
            organization_id: cluster.organization_id(),
            creator_id: cluster.creator_id(),
            created_at: cluster.created_at(),
        }
    }
}

impl From<Cluster> for ClusterView {
    fn from(cluster: Cluster) -> Self {
        (&cluster).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_parses_with_defaults() {
        let body = r#"{
            "name": "trainer",
            "docker_image": "registry/trainer:v1",
            "required_ram": 2.0,
            "required_cpu": 1.0,
            "cluster_id": 7
        }"#;
        let req: DeploymentCreate = serde_json::from_str(body).unwrap();

        assert_eq!(req.required_gpu, 0.0);
        assert_eq!(req.priority, DeploymentPriority::Medium);
        assert!(req.dependency_ids.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_body_rejects_non_positive_ram() {
        let req = DeploymentCreate {
            name: "x".to_string(),
            docker_image: "img".to_string(),
            required_ram: 0.0,
            required_cpu: 1.0,
            required_gpu: 0.0,
            priority: DeploymentPriority::Low,
            cluster_id: 1,
            dependency_ids: Vec::new(),
        };
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_update_body_accepts_partial_patch() {
        let patch: DeploymentUpdate = serde_json::from_str(r#"{"status": "running"}"#).unwrap();
        assert_eq!(patch.status, Some(DeploymentStatus::Running));
        assert!(patch.required_ram.is_none());
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_priority_wire_format_is_integer() {
        let req = DeploymentCreate {
            name: "x".to_string(),
            docker_image: "img".to_string(),
            required_ram: 1.0,
            required_cpu: 1.0,
            required_gpu: 0.0,
            priority: DeploymentPriority::High,
            cluster_id: 1,
            dependency_ids: Vec::new(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"priority\":3"), "got {}", json);
    }
}
