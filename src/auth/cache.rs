//! Request-scoped lookup cache.
//!
//! One [`RequestCache`] is created per inbound request (attached to request
//! extensions by middleware in `app.rs`) and dropped when the response is
//! sent. Within that lifetime it guarantees at most one concurrent factory
//! run per key: two sibling lookups of the same catalog issue a single
//! store round trip. Failed factory runs are never cached, so a later
//! retry (or an authorized write followed by `force_reload`) can still
//! succeed within the same request.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use super::permission::PermissionSet;
use super::ResourceKind;
use crate::errors::AppError;
use crate::models::catalog::Catalog;
use crate::models::collection::Collection;
use crate::models::group::{Group, GroupResourceGrant};
use crate::models::package::Package;

/// Typed cache key. `Display` renders the deterministic string form used
/// in trace output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CatalogSlug(String),
    PackageSlug { catalog_slug: String, package_slug: String },
    CollectionSlug(String),
    GroupSlug(String),
    DirectGrant { kind: ResourceKind, resource_id: Uuid, user_id: Uuid },
    GroupGrants { kind: ResourceKind, resource_id: Uuid, user_id: Uuid },
    GroupGrant { kind: ResourceKind, resource_id: Uuid, group_id: Uuid },
    GroupResourceGrants { group_id: Uuid, kind: ResourceKind },
    CatalogCascade { catalog_id: Uuid, user_id: Uuid },
    EffectivePermissions { kind: ResourceKind, resource_id: Uuid, user_id: Uuid },
    Membership { group_id: Uuid, user_id: Uuid },
    SiteAdmin(Uuid),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::CatalogSlug(slug) => write!(f, "CATALOG_SLUG-{slug}"),
            CacheKey::PackageSlug { catalog_slug, package_slug } => {
                write!(f, "PACKAGE_SLUG-{catalog_slug}/{package_slug}")
            }
            CacheKey::CollectionSlug(slug) => write!(f, "COLLECTION_SLUG-{slug}"),
            CacheKey::GroupSlug(slug) => write!(f, "GROUP_SLUG-{slug}"),
            CacheKey::DirectGrant { kind, resource_id, user_id } => {
                write!(f, "{}_DIRECT_GRANT_ID-{resource_id}_{user_id}", kind.as_str())
            }
            CacheKey::GroupGrants { kind, resource_id, user_id } => {
                write!(f, "{}_GROUP_GRANTS_ID-{resource_id}_{user_id}", kind.as_str())
            }
            CacheKey::GroupGrant { kind, resource_id, group_id } => {
                write!(f, "{}_GROUP_GRANT_ID-{resource_id}_{group_id}", kind.as_str())
            }
            CacheKey::GroupResourceGrants { group_id, kind } => {
                write!(f, "{}_GRANTS_FOR_GROUP-{group_id}", kind.as_str())
            }
            CacheKey::CatalogCascade { catalog_id, user_id } => {
                write!(f, "CATALOG_CASCADE_ID-{catalog_id}_{user_id}")
            }
            CacheKey::EffectivePermissions { kind, resource_id, user_id } => {
                write!(f, "{}_PERMISSION_ID-{resource_id}_{user_id}", kind.as_str())
            }
            CacheKey::Membership { group_id, user_id } => {
                write!(f, "GROUP_MEMBERSHIP_ID-{group_id}_{user_id}")
            }
            CacheKey::SiteAdmin(user_id) => write!(f, "SITE_ADMIN-{user_id}"),
        }
    }
}

/// Typed cache payload with checked accessors.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Catalog(Catalog),
    Package(Package),
    Collection(Collection),
    Group(Group),
    Permissions(PermissionSet),
    Grant(GroupResourceGrant),
    Grants(Vec<GroupResourceGrant>),
    Flag(bool),
}

impl CacheValue {
    fn mismatch(key: &str) -> AppError {
        AppError::internal(format!("cache value mismatch for {key}"))
    }

    pub fn into_catalog(self) -> Result<Catalog, AppError> {
        match self {
            CacheValue::Catalog(v) => Ok(v),
            _ => Err(Self::mismatch("catalog")),
        }
    }

    pub fn into_package(self) -> Result<Package, AppError> {
        match self {
            CacheValue::Package(v) => Ok(v),
            _ => Err(Self::mismatch("package")),
        }
    }

    pub fn into_collection(self) -> Result<Collection, AppError> {
        match self {
            CacheValue::Collection(v) => Ok(v),
            _ => Err(Self::mismatch("collection")),
        }
    }

    pub fn into_group(self) -> Result<Group, AppError> {
        match self {
            CacheValue::Group(v) => Ok(v),
            _ => Err(Self::mismatch("group")),
        }
    }

    pub fn into_permissions(self) -> Result<PermissionSet, AppError> {
        match self {
            CacheValue::Permissions(v) => Ok(v),
            _ => Err(Self::mismatch("permissions")),
        }
    }

    pub fn into_grant(self) -> Result<GroupResourceGrant, AppError> {
        match self {
            CacheValue::Grant(v) => Ok(v),
            _ => Err(Self::mismatch("grant")),
        }
    }

    pub fn into_grants(self) -> Result<Vec<GroupResourceGrant>, AppError> {
        match self {
            CacheValue::Grants(v) => Ok(v),
            _ => Err(Self::mismatch("grants")),
        }
    }

    pub fn into_flag(self) -> Result<bool, AppError> {
        match self {
            CacheValue::Flag(v) => Ok(v),
            _ => Err(Self::mismatch("flag")),
        }
    }
}

type Slot = Arc<OnceCell<CacheValue>>;

/// Per-request memoization of store lookups.
#[derive(Debug, Default)]
pub struct RequestCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

/// Cloneable handle stored in request extensions.
pub type CacheHandle = Arc<RequestCache>;

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle() -> CacheHandle {
        Arc::new(Self::new())
    }

    /// Load through the cache. On a hit the stored value is returned without
    /// running `factory`; on a miss (or with `force_reload`) exactly one
    /// concurrent caller runs `factory` while the rest await its outcome.
    pub async fn load<F, Fut>(
        &self,
        key: CacheKey,
        force_reload: bool,
        factory: F,
    ) -> Result<CacheValue, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue, AppError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            if force_reload {
                slots.insert(key.clone(), Arc::new(OnceCell::new()));
            }
            slots.entry(key).or_default().clone()
        };

        slot.get_or_try_init(factory).await.cloned()
    }

    /// Eagerly prime an entry, typically right after a write so a subsequent
    /// read in the same request observes the new value without a forced
    /// reload.
    pub async fn store(&self, key: CacheKey, value: CacheValue) {
        let mut slots = self.slots.lock().await;
        slots.insert(key, Arc::new(OnceCell::new_with(Some(value))));
    }
}
