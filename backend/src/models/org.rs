//! Organization and user registry records
//!
//! These back the authorization predicate "principal P may mutate deployment
//! D": a principal must be a member of the organization owning D's cluster.
//! Token issuance and membership management are external collaborators; the
//! core only stores the records they act on.

use crate::models::{OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organization: owns clusters, holds members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    id: OrganizationId,
    name: String,

    /// Join token handed out by the external membership surface
    invite_code: String,

    created_at: DateTime<Utc>,
}

impl Organization {
    /// Create an organization with a fresh invite code
    pub fn new(id: OrganizationId, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            invite_code: Self::generate_invite_code(),
            created_at,
        }
    }

    /// Generate a new random invite code
    pub fn generate_invite_code() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn id(&self) -> OrganizationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invite_code(&self) -> &str {
        &self.invite_code
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Replace the invite code, invalidating the previous one
    pub fn set_invite_code(&mut self, code: String) {
        self.invite_code = code;
    }
}

/// A registered user (principal)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    username: String,
    created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, username: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username,
            created_at,
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_codes_are_unique() {
        let a = Organization::new(1, "a".to_string(), Utc::now());
        let b = Organization::new(2, "b".to_string(), Utc::now());
        assert_ne!(a.invite_code(), b.invite_code());
    }
}
