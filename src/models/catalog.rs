use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::parse_uuid;
use crate::auth::permission::Permission;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Catalog {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub creator_id: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Catalog {
    fn entity_type() -> &'static str {
        "catalog"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCatalog {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    pub creator_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCatalog> for Catalog {
    type Error = AppError;

    fn try_from(value: DbCatalog) -> Result<Self, Self::Error> {
        Ok(Catalog {
            id: parse_uuid(&value.id, "catalog id")?,
            slug: value.slug,
            display_name: value.display_name,
            creator_id: parse_uuid(&value.creator_id, "catalog creator id")?,
            is_public: value.is_public,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogCreateRequest {
    #[schema(example = "noaa-climate")]
    pub slug: String,
    #[schema(example = "NOAA Climate Data")]
    pub display_name: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CatalogUpdateRequest {
    pub display_name: Option<String>,
    pub is_public: Option<bool>,
}

/// Body for setting (or revoking, with an empty list) a user's direct
/// permissions on a catalog.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetCatalogPermissionsRequest {
    #[schema(example = "grace")]
    pub username_or_email: String,
    pub permissions: Vec<Permission>,
    /// Permissions cascading to every package inside the catalog.
    #[serde(default)]
    pub package_permissions: Vec<Permission>,
}

/// A user's direct grant on a catalog, as returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogGrant {
    pub user_id: Uuid,
    pub catalog_id: Uuid,
    pub permissions: crate::auth::permission::PermissionSet,
    pub package_permissions: crate::auth::permission::PermissionSet,
}

impl Loggable for CatalogGrant {
    fn entity_type() -> &'static str {
        "catalog_grant"
    }
    fn subject_id(&self) -> Uuid {
        self.catalog_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
