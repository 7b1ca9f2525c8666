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
pub struct Collection {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Collection {
    fn entity_type() -> &'static str {
        "collection"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCollection {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCollection> for Collection {
    type Error = AppError;

    fn try_from(value: DbCollection) -> Result<Self, Self::Error> {
        Ok(Collection {
            id: parse_uuid(&value.id, "collection id")?,
            slug: value.slug,
            name: value.name,
            description: value.description,
            creator_id: parse_uuid(&value.creator_id, "collection creator id")?,
            is_public: value.is_public,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CollectionCreateRequest {
    #[schema(example = "climate-favorites")]
    pub slug: String,
    #[schema(example = "Climate Favorites")]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CollectionUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetCollectionPermissionsRequest {
    #[schema(example = "grace")]
    pub username_or_email: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionGrant {
    pub user_id: Uuid,
    pub collection_id: Uuid,
    pub permissions: PermissionSet,
}

impl Loggable for CollectionGrant {
    fn entity_type() -> &'static str {
        "collection_grant"
    }
    fn subject_id(&self) -> Uuid {
        self.collection_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
