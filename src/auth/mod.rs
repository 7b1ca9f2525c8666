//! Authorization core: permission resolution and enforcement.
//!
//! Layout mirrors the resolution pipeline:
//! - [`principal`]: who is calling (anonymous or an authenticated user)
//! - [`permission`]: the permission vocabulary and set type
//! - [`cache`]: request-scoped memoization of lookups
//! - [`store`]: grant/membership reads and writes, cache-composed
//! - [`resolver`]: effective permission computation (direct + group + cascade)
//! - [`visibility`]: SQL predicates gating resource listings
//! - [`guard`]: the interceptor wrapping sensitive operations

pub mod cache;
pub mod guard;
pub mod permission;
pub mod principal;
pub mod resolver;
pub mod store;
pub mod visibility;

pub use cache::{CacheHandle, CacheKey, CacheValue, RequestCache};
pub use guard::{Guard, ResourceRef};
pub use permission::{Permission, PermissionSet};
pub use principal::Principal;
pub use store::PermissionStore;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::catalog::Catalog;
use crate::models::collection::Collection;
use crate::models::package::Package;

/// The kinds of resources permissions can be granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    Catalog,
    Package,
    Collection,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Catalog => "CATALOG",
            ResourceKind::Package => "PACKAGE",
            ResourceKind::Collection => "COLLECTION",
        }
    }
}

/// A resolved resource, as handed to guarded handlers.
#[derive(Debug, Clone)]
pub enum Resource {
    Catalog(Catalog),
    Package(Package),
    Collection(Collection),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Catalog(_) => ResourceKind::Catalog,
            Resource::Package(_) => ResourceKind::Package,
            Resource::Collection(_) => ResourceKind::Collection,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Resource::Catalog(c) => c.id,
            Resource::Package(p) => p.id,
            Resource::Collection(c) => c.id,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Resource::Catalog(c) => &c.slug,
            Resource::Package(p) => &p.slug,
            Resource::Collection(c) => &c.slug,
        }
    }

    pub fn is_public(&self) -> bool {
        match self {
            Resource::Catalog(c) => c.is_public,
            Resource::Package(p) => p.is_public,
            Resource::Collection(c) => c.is_public,
        }
    }
}
