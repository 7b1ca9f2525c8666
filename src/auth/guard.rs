//! The authorization guard.
//!
//! A [`Guard`] wraps a sensitive operation: it is constructed with the
//! resource kind and required permission at route registration time, pulls
//! the target resource identifier out of the operation's argument document,
//! resolves the caller's effective permissions, and only then lets the
//! underlying handler run.
//!
//! Failure policy, applied uniformly to every resource kind: an identifier
//! that resolves to nothing is `RESOURCE_NOT_FOUND`; an existing resource
//! without the required permission is `NOT_AUTHENTICATED` for anonymous
//! callers and `NOT_AUTHORIZED` for authenticated ones.

use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use super::permission::Permission;
use super::resolver::effective_permissions;
use super::store::PermissionStore;
use super::{Principal, Resource, ResourceKind};
use crate::errors::AppError;
use crate::models::group::Group;

/// Identifier extracted from a guarded operation's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Catalog { slug: String },
    Package { catalog_slug: String, package_slug: String },
    Collection { slug: String },
}

#[derive(Debug, Clone, Copy)]
pub struct Guard {
    kind: ResourceKind,
    required: Permission,
}

impl Guard {
    pub const fn new(kind: ResourceKind, required: Permission) -> Self {
        Self { kind, required }
    }

    pub const fn catalog(required: Permission) -> Self {
        Self::new(ResourceKind::Catalog, required)
    }

    pub const fn package(required: Permission) -> Self {
        Self::new(ResourceKind::Package, required)
    }

    pub const fn collection(required: Permission) -> Self {
        Self::new(ResourceKind::Collection, required)
    }

    pub fn required(&self) -> Permission {
        self.required
    }

    /// Extract the target resource identifier from `args`.
    ///
    /// Precedence per field: top-level, then `value.*`, then `identifier.*`,
    /// then any top-level `*Identifier` object. A missing identifier is a
    /// caller bug surfaced as a configuration error, not an authorization
    /// failure.
    pub fn extract_ref(&self, args: &Value) -> Result<ResourceRef, AppError> {
        match self.kind {
            ResourceKind::Catalog => Ok(ResourceRef::Catalog {
                slug: find_identifier(args, "catalogSlug")?,
            }),
            ResourceKind::Package => Ok(ResourceRef::Package {
                catalog_slug: find_identifier(args, "catalogSlug")?,
                package_slug: find_identifier(args, "packageSlug")?,
            }),
            ResourceKind::Collection => Ok(ResourceRef::Collection {
                slug: find_identifier(args, "collectionSlug")?,
            }),
        }
    }

    /// Resolve the target resource and verify the caller holds the required
    /// permission. Site admins pass unconditionally.
    pub async fn authorize(
        &self,
        store: &PermissionStore<'_>,
        principal: &Principal,
        args: &Value,
    ) -> Result<Resource, AppError> {
        let reference = self.extract_ref(args)?;
        let resource = store.resolve(&reference).await?;

        // public resources are readable by anyone, grants or not
        if self.required == Permission::View && resource.is_public() {
            return Ok(resource);
        }

        if let Principal::User(user_id) = principal {
            if store.is_site_admin(*user_id).await? {
                return Ok(resource);
            }
        }

        let effective = effective_permissions(store, principal, &resource).await?;
        if effective.contains(self.required) {
            return Ok(resource);
        }

        Err(deny(principal, self.required, resource.slug()))
    }

    /// Authorize, then run the wrapped handler with the resolved resource.
    /// The handler's result is returned unchanged.
    pub async fn run<T, H, Fut>(
        &self,
        store: &PermissionStore<'_>,
        principal: &Principal,
        args: &Value,
        handler: H,
    ) -> Result<T, AppError>
    where
        H: FnOnce(Resource) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let resource = self.authorize(store, principal, args).await?;
        handler(resource).await
    }
}

/// Verify the caller holds `required` within the group (site admins pass).
/// Groups follow the same failure policy as guarded resources.
pub async fn require_group_permission(
    store: &PermissionStore<'_>,
    principal: &Principal,
    group: &Group,
    required: Permission,
) -> Result<Uuid, AppError> {
    let user_id = match principal {
        Principal::Anonymous => {
            return Err(deny(principal, required, &group.slug));
        }
        Principal::User(id) => *id,
    };

    if store.is_site_admin(user_id).await? {
        return Ok(user_id);
    }

    let membership = store.membership_permissions(group.id, user_id).await?;
    if membership.contains(required) {
        return Ok(user_id);
    }

    Err(deny(principal, required, &group.slug))
}

fn deny(principal: &Principal, required: Permission, slug: &str) -> AppError {
    if principal.is_anonymous() {
        AppError::not_authenticated(format!("{required} on {slug} requires authentication"))
    } else {
        AppError::not_authorized(format!("{required} permission required on {slug}"))
    }
}

/// Search `args` for `field`, honoring the documented precedence order.
fn find_identifier(args: &Value, field: &str) -> Result<String, AppError> {
    if let Some(found) = args.get(field).and_then(Value::as_str) {
        return Ok(found.to_string());
    }
    for nested in ["value", "identifier"] {
        if let Some(found) = args.get(nested).and_then(|v| v.get(field)).and_then(Value::as_str) {
            return Ok(found.to_string());
        }
    }
    if let Some(object) = args.as_object() {
        for (key, value) in object {
            if key.ends_with("Identifier") {
                if let Some(found) = value.get(field).and_then(Value::as_str) {
                    return Ok(found.to_string());
                }
            }
        }
    }
    Err(AppError::configuration(format!(
        "no {field} identifier in request arguments"
    )))
}
