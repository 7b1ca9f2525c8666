//! Permission store adapter.
//!
//! All reads go through the request cache; absence of a grant is an empty
//! set or an empty list, never an error. Fetch boundaries are explicit
//! joined queries; nothing here relies on implicit relation loading.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::cache::{CacheKey, CacheValue, RequestCache};
use super::guard::ResourceRef;
use super::permission::PermissionSet;
use super::{Resource, ResourceKind};
use crate::errors::AppError;
use crate::models::catalog::{Catalog, DbCatalog};
use crate::models::collection::{Collection, DbCollection};
use crate::models::group::{DbGroup, Group, GroupResourceGrant};
use crate::models::package::{DbPackage, Package};
use crate::models::parse_uuid;
use crate::models::user::{DbUser, User};
use crate::utils::utc_now;

pub struct PermissionStore<'a> {
    pool: &'a SqlitePool,
    cache: &'a RequestCache,
}

impl<'a> PermissionStore<'a> {
    pub fn new(pool: &'a SqlitePool, cache: &'a RequestCache) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &RequestCache {
        self.cache
    }

    // ------------------------------------------------------------------
    // Resource lookups
    // ------------------------------------------------------------------

    pub async fn catalog_by_slug(&self, slug: &str) -> Result<Catalog, AppError> {
        let pool = self.pool;
        let owned = slug.to_string();
        self.cache
            .load(CacheKey::CatalogSlug(owned.clone()), false, || async move {
                let row = sqlx::query_as::<_, DbCatalog>(
                    "SELECT id, slug, display_name, creator_id, is_public, created_at, updated_at \
                     FROM catalogs WHERE slug = ?",
                )
                .bind(&owned)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found(format!("catalog {owned} not found")))?;
                Ok(CacheValue::Catalog(row.try_into()?))
            })
            .await?
            .into_catalog()
    }

    pub async fn package_by_slug(
        &self,
        catalog_slug: &str,
        package_slug: &str,
    ) -> Result<Package, AppError> {
        let pool = self.pool;
        let key = CacheKey::PackageSlug {
            catalog_slug: catalog_slug.to_string(),
            package_slug: package_slug.to_string(),
        };
        let (catalog_owned, package_owned) = (catalog_slug.to_string(), package_slug.to_string());
        self.cache
            .load(key, false, || async move {
                let row = sqlx::query_as::<_, DbPackage>(
                    "SELECT p.id, p.catalog_id, p.slug, p.display_name, p.description, \
                            p.creator_id, p.is_public, p.created_at, p.updated_at \
                     FROM packages p \
                     INNER JOIN catalogs c ON c.id = p.catalog_id \
                     WHERE c.slug = ? AND p.slug = ?",
                )
                .bind(&catalog_owned)
                .bind(&package_owned)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("package {catalog_owned}/{package_owned} not found"))
                })?;
                Ok(CacheValue::Package(row.try_into()?))
            })
            .await?
            .into_package()
    }

    pub async fn collection_by_slug(
        &self,
        slug: &str,
    ) -> Result<Collection, AppError> {
        let pool = self.pool;
        let owned = slug.to_string();
        self.cache
            .load(CacheKey::CollectionSlug(owned.clone()), false, || async move {
                let row = sqlx::query_as::<_, DbCollection>(
                    "SELECT id, slug, name, description, creator_id, is_public, created_at, updated_at \
                     FROM collections WHERE slug = ?",
                )
                .bind(&owned)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found(format!("collection {owned} not found")))?;
                Ok(CacheValue::Collection(row.try_into()?))
            })
            .await?
            .into_collection()
    }

    pub async fn group_by_slug(&self, slug: &str) -> Result<Group, AppError> {
        let pool = self.pool;
        let owned = slug.to_string();
        self.cache
            .load(CacheKey::GroupSlug(owned.clone()), false, || async move {
                let row = sqlx::query_as::<_, DbGroup>(
                    "SELECT id, slug, name, description, creator_id, is_admin, created_at, updated_at \
                     FROM groups WHERE slug = ?",
                )
                .bind(&owned)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| AppError::not_found(format!("group {owned} not found")))?;
                Ok(CacheValue::Group(row.try_into()?))
            })
            .await?
            .into_group()
    }

    pub async fn resolve(&self, reference: &ResourceRef) -> Result<Resource, AppError> {
        match reference {
            ResourceRef::Catalog { slug } => Ok(Resource::Catalog(self.catalog_by_slug(slug).await?)),
            ResourceRef::Package { catalog_slug, package_slug } => Ok(Resource::Package(
                self.package_by_slug(catalog_slug, package_slug).await?,
            )),
            ResourceRef::Collection { slug } => {
                Ok(Resource::Collection(self.collection_by_slug(slug).await?))
            }
        }
    }

    /// Uncached: used on write paths to resolve membership and grant targets.
    pub async fn user_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, email, password_hash, created_at, updated_at \
             FROM users WHERE username = ? OR email = ?",
        )
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    // ------------------------------------------------------------------
    // Grant reads
    // ------------------------------------------------------------------

    /// The user's direct grant on the resource; empty if none exists.
    pub async fn direct_grant(&self, user_id: Uuid, resource: &Resource) -> Result<PermissionSet, AppError> {
        let pool = self.pool;
        let kind = resource.kind();
        let resource_id = resource.id();
        let key = CacheKey::DirectGrant { kind, resource_id, user_id };

        self.cache
            .load(key, false, || async move {
                let sql = match kind {
                    ResourceKind::Catalog => {
                        "SELECT permissions FROM user_catalog_permissions \
                         WHERE user_id = ? AND catalog_id = ?"
                    }
                    ResourceKind::Package => {
                        "SELECT permissions FROM user_package_permissions \
                         WHERE user_id = ? AND package_id = ?"
                    }
                    ResourceKind::Collection => {
                        "SELECT permissions FROM user_collection_permissions \
                         WHERE user_id = ? AND collection_id = ?"
                    }
                };
                let raw: Option<String> = sqlx::query_scalar(sql)
                    .bind(user_id.to_string())
                    .bind(resource_id.to_string())
                    .fetch_optional(pool)
                    .await?;
                let set = raw.map(|r| PermissionSet::from_db(&r)).unwrap_or_default();
                Ok(CacheValue::Permissions(set))
            })
            .await?
            .into_permissions()
    }

    /// Grants on this resource held by groups the user belongs to.
    pub async fn group_grants_for_resource(
        &self,
        user_id: Uuid,
        resource: &Resource,
    ) -> Result<Vec<GroupResourceGrant>, AppError> {
        let pool = self.pool;
        let kind = resource.kind();
        let resource_id = resource.id();
        let key = CacheKey::GroupGrants { kind, resource_id, user_id };

        self.cache
            .load(key, false, || async move {
                let sql = match kind {
                    ResourceKind::Catalog => {
                        "SELECT gp.group_id, gp.catalog_id AS resource_id, gp.permissions, \
                                gp.package_permissions \
                         FROM group_catalog_permissions gp \
                         INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                         WHERE gp.catalog_id = ? AND m.user_id = ?"
                    }
                    ResourceKind::Package => {
                        "SELECT gp.group_id, gp.package_id AS resource_id, gp.permissions, \
                                NULL AS package_permissions \
                         FROM group_package_permissions gp \
                         INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                         WHERE gp.package_id = ? AND m.user_id = ?"
                    }
                    ResourceKind::Collection => {
                        "SELECT gp.group_id, gp.collection_id AS resource_id, gp.permissions, \
                                NULL AS package_permissions \
                         FROM group_collection_permissions gp \
                         INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                         WHERE gp.collection_id = ? AND m.user_id = ?"
                    }
                };
                let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(sql)
                    .bind(resource_id.to_string())
                    .bind(user_id.to_string())
                    .fetch_all(pool)
                    .await?;

                let grants = rows
                    .into_iter()
                    .map(|(group_id, resource_id, permissions, package_permissions)| {
                        Ok(GroupResourceGrant {
                            group_id: parse_uuid(&group_id, "grant group id")?,
                            resource_id: parse_uuid(&resource_id, "grant resource id")?,
                            permissions: PermissionSet::from_db(&permissions),
                            package_permissions: package_permissions
                                .map(|raw| PermissionSet::from_db(&raw)),
                        })
                    })
                    .collect::<Result<Vec<_>, AppError>>()?;
                Ok(CacheValue::Grants(grants))
            })
            .await?
            .into_grants()
    }

    /// Every grant a group holds on resources of one kind.
    pub async fn grants_for_group(
        &self,
        group_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<GroupResourceGrant>, AppError> {
        let pool = self.pool;
        let key = CacheKey::GroupResourceGrants { group_id, kind };

        self.cache
            .load(key, false, || async move {
                let sql = match kind {
                    ResourceKind::Catalog => {
                        "SELECT group_id, catalog_id AS resource_id, permissions, \
                                package_permissions \
                         FROM group_catalog_permissions WHERE group_id = ?"
                    }
                    ResourceKind::Package => {
                        "SELECT group_id, package_id AS resource_id, permissions, \
                                NULL AS package_permissions \
                         FROM group_package_permissions WHERE group_id = ?"
                    }
                    ResourceKind::Collection => {
                        "SELECT group_id, collection_id AS resource_id, permissions, \
                                NULL AS package_permissions \
                         FROM group_collection_permissions WHERE group_id = ?"
                    }
                };
                let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(sql)
                    .bind(group_id.to_string())
                    .fetch_all(pool)
                    .await?;

                let grants = rows
                    .into_iter()
                    .map(|(group_id, resource_id, permissions, package_permissions)| {
                        Ok(GroupResourceGrant {
                            group_id: parse_uuid(&group_id, "grant group id")?,
                            resource_id: parse_uuid(&resource_id, "grant resource id")?,
                            permissions: PermissionSet::from_db(&permissions),
                            package_permissions: package_permissions
                                .map(|raw| PermissionSet::from_db(&raw)),
                        })
                    })
                    .collect::<Result<Vec<_>, AppError>>()?;
                Ok(CacheValue::Grants(grants))
            })
            .await?
            .into_grants()
    }

    /// Union of catalog-level `package_permissions` the user holds on a
    /// catalog, directly or through group membership. Applies to every
    /// package inside the catalog, including ones created after the grant.
    pub async fn catalog_package_cascade(
        &self,
        user_id: Uuid,
        catalog_id: Uuid,
    ) -> Result<PermissionSet, AppError> {
        let pool = self.pool;
        let key = CacheKey::CatalogCascade { catalog_id, user_id };

        self.cache
            .load(key, false, || async move {
                let rows: Vec<String> = sqlx::query_scalar(
                    "SELECT package_permissions FROM user_catalog_permissions \
                     WHERE user_id = ? AND catalog_id = ? \
                     UNION ALL \
                     SELECT gp.package_permissions FROM group_catalog_permissions gp \
                     INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                     WHERE m.user_id = ? AND gp.catalog_id = ?",
                )
                .bind(user_id.to_string())
                .bind(catalog_id.to_string())
                .bind(user_id.to_string())
                .bind(catalog_id.to_string())
                .fetch_all(pool)
                .await?;

                let mut set = PermissionSet::new();
                for raw in rows {
                    set.union_with(&PermissionSet::from_db(&raw));
                }
                Ok(CacheValue::Permissions(set))
            })
            .await?
            .into_permissions()
    }

    /// The user's permissions within a group; empty when not a member.
    pub async fn membership_permissions(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<PermissionSet, AppError> {
        let pool = self.pool;
        let key = CacheKey::Membership { group_id, user_id };

        self.cache
            .load(key, false, || async move {
                let raw: Option<String> = sqlx::query_scalar(
                    "SELECT permissions FROM group_memberships WHERE group_id = ? AND user_id = ?",
                )
                .bind(group_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(pool)
                .await?;
                Ok(CacheValue::Permissions(
                    raw.map(|r| PermissionSet::from_db(&r)).unwrap_or_default(),
                ))
            })
            .await?
            .into_permissions()
    }

    /// Membership in any admin group grants site-wide administrative
    /// capability, checked separately from resource permissions.
    pub async fn is_site_admin(&self, user_id: Uuid) -> Result<bool, AppError> {
        let pool = self.pool;

        self.cache
            .load(CacheKey::SiteAdmin(user_id), false, || async move {
                let admin: bool = sqlx::query_scalar(
                    "SELECT EXISTS( \
                        SELECT 1 FROM group_memberships m \
                        INNER JOIN groups g ON g.id = m.group_id \
                        WHERE m.user_id = ? AND g.is_admin = 1)",
                )
                .bind(user_id.to_string())
                .fetch_one(pool)
                .await?;
                Ok(CacheValue::Flag(admin))
            })
            .await?
            .into_flag()
    }

    // ------------------------------------------------------------------
    // Grant writes
    // ------------------------------------------------------------------

    /// Update-else-insert a group's grant on a resource, then re-fetch the
    /// persisted row so callers see a consistent snapshot rather than the
    /// in-memory arguments.
    pub async fn upsert_group_grant(
        &self,
        group_id: Uuid,
        resource: &Resource,
        permissions: &PermissionSet,
        package_permissions: Option<&PermissionSet>,
    ) -> Result<GroupResourceGrant, AppError> {
        let now = utc_now();
        let resource_id = resource.id();

        match resource.kind() {
            ResourceKind::Catalog => {
                sqlx::query(
                    "INSERT INTO group_catalog_permissions \
                         (group_id, catalog_id, permissions, package_permissions, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(group_id, catalog_id) DO UPDATE SET \
                         permissions = excluded.permissions, \
                         package_permissions = excluded.package_permissions, \
                         updated_at = excluded.updated_at",
                )
                .bind(group_id.to_string())
                .bind(resource_id.to_string())
                .bind(permissions.to_db())
                .bind(package_permissions.cloned().unwrap_or_default().to_db())
                .bind(now)
                .bind(now)
                .execute(self.pool)
                .await?;
            }
            ResourceKind::Package => {
                sqlx::query(
                    "INSERT INTO group_package_permissions \
                         (group_id, package_id, permissions, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(group_id, package_id) DO UPDATE SET \
                         permissions = excluded.permissions, \
                         updated_at = excluded.updated_at",
                )
                .bind(group_id.to_string())
                .bind(resource_id.to_string())
                .bind(permissions.to_db())
                .bind(now)
                .bind(now)
                .execute(self.pool)
                .await?;
            }
            ResourceKind::Collection => {
                sqlx::query(
                    "INSERT INTO group_collection_permissions \
                         (group_id, collection_id, permissions, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(group_id, collection_id) DO UPDATE SET \
                         permissions = excluded.permissions, \
                         updated_at = excluded.updated_at",
                )
                .bind(group_id.to_string())
                .bind(resource_id.to_string())
                .bind(permissions.to_db())
                .bind(now)
                .bind(now)
                .execute(self.pool)
                .await?;
            }
        }

        // forced reload re-fetches the persisted row and leaves it primed,
        // so reads later in this request observe the write
        self.fetch_group_grant(group_id, resource, true).await
    }

    async fn fetch_group_grant(
        &self,
        group_id: Uuid,
        resource: &Resource,
        force_reload: bool,
    ) -> Result<GroupResourceGrant, AppError> {
        let pool = self.pool;
        let kind = resource.kind();
        let resource_id = resource.id();
        let key = CacheKey::GroupGrant { kind, resource_id, group_id };

        self.cache
            .load(key, force_reload, || async move {
                let sql = match kind {
                    ResourceKind::Catalog => {
                        "SELECT permissions, package_permissions \
                         FROM group_catalog_permissions \
                         WHERE group_id = ? AND catalog_id = ?"
                    }
                    ResourceKind::Package => {
                        "SELECT permissions, NULL AS package_permissions \
                         FROM group_package_permissions \
                         WHERE group_id = ? AND package_id = ?"
                    }
                    ResourceKind::Collection => {
                        "SELECT permissions, NULL AS package_permissions \
                         FROM group_collection_permissions \
                         WHERE group_id = ? AND collection_id = ?"
                    }
                };

                let (permissions, package_permissions): (String, Option<String>) =
                    sqlx::query_as(sql)
                        .bind(group_id.to_string())
                        .bind(resource_id.to_string())
                        .fetch_one(pool)
                        .await?;

                Ok(CacheValue::Grant(GroupResourceGrant {
                    group_id,
                    resource_id,
                    permissions: PermissionSet::from_db(&permissions),
                    package_permissions: package_permissions
                        .map(|raw| PermissionSet::from_db(&raw)),
                }))
            })
            .await?
            .into_grant()
    }

    /// Set or revoke (empty set) a user's direct grant on a resource.
    /// Primes the cache so reads later in this request observe the write.
    pub async fn set_direct_grant(
        &self,
        user_id: Uuid,
        resource: &Resource,
        permissions: &PermissionSet,
        package_permissions: Option<&PermissionSet>,
    ) -> Result<(), AppError> {
        let now = utc_now();
        let resource_id = resource.id();

        if permissions.is_empty() {
            let sql = match resource.kind() {
                ResourceKind::Catalog => {
                    "DELETE FROM user_catalog_permissions WHERE user_id = ? AND catalog_id = ?"
                }
                ResourceKind::Package => {
                    "DELETE FROM user_package_permissions WHERE user_id = ? AND package_id = ?"
                }
                ResourceKind::Collection => {
                    "DELETE FROM user_collection_permissions WHERE user_id = ? AND collection_id = ?"
                }
            };
            sqlx::query(sql)
                .bind(user_id.to_string())
                .bind(resource_id.to_string())
                .execute(self.pool)
                .await?;
        } else {
            match resource.kind() {
                ResourceKind::Catalog => {
                    sqlx::query(
                        "INSERT INTO user_catalog_permissions \
                             (user_id, catalog_id, permissions, package_permissions, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?) \
                         ON CONFLICT(user_id, catalog_id) DO UPDATE SET \
                             permissions = excluded.permissions, \
                             package_permissions = excluded.package_permissions, \
                             updated_at = excluded.updated_at",
                    )
                    .bind(user_id.to_string())
                    .bind(resource_id.to_string())
                    .bind(permissions.to_db())
                    .bind(package_permissions.cloned().unwrap_or_default().to_db())
                    .bind(now)
                    .bind(now)
                    .execute(self.pool)
                    .await?;
                }
                ResourceKind::Package => {
                    sqlx::query(
                        "INSERT INTO user_package_permissions \
                             (user_id, package_id, permissions, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?) \
                         ON CONFLICT(user_id, package_id) DO UPDATE SET \
                             permissions = excluded.permissions, \
                             updated_at = excluded.updated_at",
                    )
                    .bind(user_id.to_string())
                    .bind(resource_id.to_string())
                    .bind(permissions.to_db())
                    .bind(now)
                    .bind(now)
                    .execute(self.pool)
                    .await?;
                }
                ResourceKind::Collection => {
                    sqlx::query(
                        "INSERT INTO user_collection_permissions \
                             (user_id, collection_id, permissions, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?) \
                         ON CONFLICT(user_id, collection_id) DO UPDATE SET \
                             permissions = excluded.permissions, \
                             updated_at = excluded.updated_at",
                    )
                    .bind(user_id.to_string())
                    .bind(resource_id.to_string())
                    .bind(permissions.to_db())
                    .bind(now)
                    .bind(now)
                    .execute(self.pool)
                    .await?;
                }
            }
        }

        // prime so a recomputation within this request reflects the write
        self.cache
            .store(
                CacheKey::DirectGrant { kind: resource.kind(), resource_id, user_id },
                CacheValue::Permissions(permissions.clone()),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;
    use crate::utils::utc_now;

    async fn seeded_pool() -> (SqlitePool, tempfile::TempDir, Uuid, Catalog) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("store.db").display());
        let pool = crate::db::connect(&url).await.expect("pool");

        let now = utc_now();
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) \
             VALUES (?, 'owner', 'owner@example.com', 'x', ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .expect("user row");

        let group_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO groups (id, slug, name, description, creator_id, is_admin, created_at, updated_at) \
             VALUES (?, 'team', 'Team', NULL, ?, 0, ?, ?)",
        )
        .bind(group_id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .expect("group row");

        let catalog = Catalog {
            id: Uuid::new_v4(),
            slug: "data".to_string(),
            display_name: "Data".to_string(),
            creator_id: user_id,
            is_public: false,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO catalogs (id, slug, display_name, creator_id, is_public, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(catalog.id.to_string())
        .bind(&catalog.slug)
        .bind(&catalog.display_name)
        .bind(catalog.creator_id.to_string())
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .expect("catalog row");

        (pool, dir, group_id, catalog)
    }

    #[tokio::test]
    async fn upsert_group_grant_leaves_the_fresh_row_primed() {
        let (pool, _dir, group_id, catalog) = seeded_pool().await;
        let cache = RequestCache::new();
        let store = PermissionStore::new(&pool, &cache);

        let resource = Resource::Catalog(catalog.clone());
        let granted: PermissionSet = vec![Permission::View, Permission::Edit].into();
        let grant = store
            .upsert_group_grant(group_id, &resource, &granted, None)
            .await
            .expect("upsert");
        assert_eq!(grant.permissions, granted);

        // a cache hit never runs the factory, so an erroring factory proves
        // the upsert left the row primed
        let key = CacheKey::GroupGrant {
            kind: ResourceKind::Catalog,
            resource_id: catalog.id,
            group_id,
        };
        let cached = cache
            .load(key, false, || async {
                Err(AppError::internal("factory must not run"))
            })
            .await
            .expect("primed grant")
            .into_grant()
            .expect("grant value");
        assert_eq!(cached.permissions, granted);
    }

    #[tokio::test]
    async fn grants_for_group_enumerates_each_kind() {
        let (pool, _dir, group_id, catalog) = seeded_pool().await;
        let cache = RequestCache::new();
        let store = PermissionStore::new(&pool, &cache);

        let granted: PermissionSet = vec![Permission::View].into();
        store
            .upsert_group_grant(group_id, &Resource::Catalog(catalog.clone()), &granted, None)
            .await
            .expect("upsert");

        let catalog_grants = store
            .grants_for_group(group_id, ResourceKind::Catalog)
            .await
            .expect("catalog grants");
        assert_eq!(catalog_grants.len(), 1);
        assert_eq!(catalog_grants[0].resource_id, catalog.id);
        assert_eq!(catalog_grants[0].permissions, granted);

        let package_grants = store
            .grants_for_group(group_id, ResourceKind::Package)
            .await
            .expect("package grants");
        assert!(package_grants.is_empty());
    }
}
