use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::parse_uuid;
use crate::auth::permission::{Permission, PermissionSet};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Group {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    /// Members of an admin group hold site-wide administrative capability.
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Group {
    fn entity_type() -> &'static str {
        "group"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGroup {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbGroup> for Group {
    type Error = AppError;

    fn try_from(value: DbGroup) -> Result<Self, Self::Error> {
        Ok(Group {
            id: parse_uuid(&value.id, "group id")?,
            slug: value.slug,
            name: value.name,
            description: value.description,
            creator_id: parse_uuid(&value.creator_id, "group creator id")?,
            is_admin: value.is_admin,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// A user's permissions within a group's administrative scope.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub permissions: PermissionSet,
}

impl Loggable for GroupMembership {
    fn entity_type() -> &'static str {
        "group_membership"
    }
    fn subject_id(&self) -> Uuid {
        self.group_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGroupMembership {
    pub group_id: String,
    pub user_id: String,
    pub permissions: String,
}

impl TryFrom<DbGroupMembership> for GroupMembership {
    type Error = AppError;

    fn try_from(value: DbGroupMembership) -> Result<Self, Self::Error> {
        Ok(GroupMembership {
            group_id: parse_uuid(&value.group_id, "membership group id")?,
            user_id: parse_uuid(&value.user_id, "membership user id")?,
            permissions: PermissionSet::from_db(&value.permissions),
        })
    }
}

/// A group's grant on one resource. `package_permissions` is only present
/// for catalog grants, where it cascades to every package in the catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupResourceGrant {
    pub group_id: Uuid,
    pub resource_id: Uuid,
    pub permissions: PermissionSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_permissions: Option<PermissionSet>,
}

impl Loggable for GroupResourceGrant {
    fn entity_type() -> &'static str {
        "group_grant"
    }
    fn subject_id(&self) -> Uuid {
        self.resource_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupCreateRequest {
    #[schema(example = "data-team")]
    pub slug: String,
    #[schema(example = "Data Team")]
    pub name: String,
    pub description: Option<String>,
}

/// Body for adding a member or updating an existing member's permissions.
/// An empty permission list is equivalent to removal.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    #[schema(example = "grace@example.com")]
    pub username_or_email: String,
    pub permissions: Vec<Permission>,
}

/// Body for granting a group permissions on a resource.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupGrantRequest {
    pub permissions: Vec<Permission>,
    /// Only meaningful for catalog grants.
    #[serde(default)]
    pub package_permissions: Vec<Permission>,
}
