//! Effective permission computation.
//!
//! The resolver unions three sources for a (principal, resource) pair:
//! the user's direct grant, grants held by groups the user belongs to, and
//! for packages the parent catalog's package-permission cascade. It returns
//! exactly the granted set; it never infers MANAGE from EDIT or similar.

use super::permission::PermissionSet;
use super::cache::{CacheKey, CacheValue};
use super::store::PermissionStore;
use super::{Principal, Resource};
use crate::errors::AppError;

/// Compute the effective permission set for a principal on a resource.
///
/// Anonymous principals always resolve to the empty set; what they may see
/// is decided by the visibility predicate at listing time, not here. The
/// result is cached per request under the composite permission key.
pub async fn effective_permissions(
    store: &PermissionStore<'_>,
    principal: &Principal,
    resource: &Resource,
) -> Result<PermissionSet, AppError> {
    let user_id = match principal {
        Principal::Anonymous => return Ok(PermissionSet::new()),
        Principal::User(id) => *id,
    };

    let key = CacheKey::EffectivePermissions {
        kind: resource.kind(),
        resource_id: resource.id(),
        user_id,
    };

    store
        .cache()
        .load(key, false, || async {
            let mut effective = store.direct_grant(user_id, resource).await?;

            for grant in store.group_grants_for_resource(user_id, resource).await? {
                effective.union_with(&grant.permissions);
            }

            if let Resource::Package(package) = resource {
                let cascade = store
                    .catalog_package_cascade(user_id, package.catalog_id)
                    .await?;
                effective.union_with(&cascade);
            }

            tracing::debug!(
                user_id = %user_id,
                resource = %resource.slug(),
                kind = ?resource.kind(),
                permissions = %effective,
                "resolved effective permissions"
            );
            Ok(CacheValue::Permissions(effective))
        })
        .await?
        .into_permissions()
}
