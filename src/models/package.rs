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
pub struct Package {
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Package {
    fn entity_type() -> &'static str {
        "package"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPackage {
    pub id: String,
    pub catalog_id: String,
    pub slug: String,
    pub display_name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPackage> for Package {
    type Error = AppError;

    fn try_from(value: DbPackage) -> Result<Self, Self::Error> {
        Ok(Package {
            id: parse_uuid(&value.id, "package id")?,
            catalog_id: parse_uuid(&value.catalog_id, "package catalog id")?,
            slug: value.slug,
            display_name: value.display_name,
            description: value.description,
            creator_id: parse_uuid(&value.creator_id, "package creator id")?,
            is_public: value.is_public,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PackageCreateRequest {
    #[schema(example = "daily-temperature")]
    pub slug: String,
    #[schema(example = "Daily Temperature Readings")]
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PackageUpdateRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetPackagePermissionsRequest {
    #[schema(example = "grace")]
    pub username_or_email: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackageGrant {
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub permissions: PermissionSet,
}

impl Loggable for PackageGrant {
    fn entity_type() -> &'static str {
        "package_grant"
    }
    fn subject_id(&self) -> Uuid {
        self.package_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
