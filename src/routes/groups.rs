use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Extension, Json, Router};
use serde_json::json;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::cache::{CacheKey, CacheValue};
use crate::auth::guard::{require_group_permission, Guard};
use crate::auth::visibility::{catalog_filter, collection_filter, package_filter};
use crate::auth::{
    CacheHandle, Permission, PermissionSet, PermissionStore, Principal, ResourceKind,
};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::catalog::{Catalog, DbCatalog};
use crate::models::collection::{Collection, DbCollection};
use crate::models::group::{
    DbGroupMembership, Group, GroupCreateRequest, GroupGrantRequest, GroupMembership,
    GroupResourceGrant, MembershipRequest,
};
use crate::models::package::{DbPackage, Package};
use crate::models::user::User;
use crate::notify::templates;
use crate::utils::{is_valid_email, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_group))
        .route("/:group_slug", get(get_group))
        .route("/:group_slug/members", get(list_members).put(set_membership))
        .route("/:group_slug/members/:username", delete(remove_member))
        .route("/:group_slug/catalogs", get(list_group_catalogs))
        .route("/:group_slug/catalogs/:catalog_slug", put(grant_catalog))
        .route("/:group_slug/packages", get(list_group_packages))
        .route(
            "/:group_slug/packages/:catalog_slug/:package_slug",
            put(grant_package),
        )
        .route("/:group_slug/collections", get(list_group_collections))
        .route("/:group_slug/collections/:collection_slug", put(grant_collection))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "Groups",
    request_body = GroupCreateRequest,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    let now = utc_now();
    let group = Group {
        id: Uuid::new_v4(),
        slug: payload.slug,
        name: payload.name,
        description: payload.description,
        creator_id: auth.user_id,
        is_admin: false,
        created_at: now,
        updated_at: now,
    };

    // group row and creator membership land together or not at all
    let mut tx = state.pool.begin().await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM groups WHERE slug = ?")
        .bind(&group.slug)
        .fetch_one(&mut *tx)
        .await?;
    if count > 0 {
        return Err(AppError::not_unique("group slug already in use"));
    }

    sqlx::query(
        "INSERT INTO groups (id, slug, name, description, creator_id, is_admin, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(group.id.to_string())
    .bind(&group.slug)
    .bind(&group.name)
    .bind(&group.description)
    .bind(group.creator_id.to_string())
    .bind(group.is_admin)
    .bind(group.created_at)
    .bind(group.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO group_memberships (group_id, user_id, permissions, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(group.id.to_string())
    .bind(auth.user_id.to_string())
    .bind(PermissionSet::all().to_db())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &group);

    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/groups/{group_slug}",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    responses(
        (status = 200, description = "Group", body = Group),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_group(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
) -> AppResult<Json<Group>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    require_group_permission(&store, &principal, &group, Permission::View).await?;
    Ok(Json(group))
}

#[utoipa::path(
    get,
    path = "/groups/{group_slug}/members",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    responses(
        (status = 200, description = "Group members", body = [GroupMembership]),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
) -> AppResult<Json<Vec<GroupMembership>>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    require_group_permission(&store, &principal, &group, Permission::View).await?;

    let rows = sqlx::query_as::<_, DbGroupMembership>(
        "SELECT group_id, user_id, permissions FROM group_memberships WHERE group_id = ?",
    )
    .bind(group.id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let members = rows
        .into_iter()
        .map(GroupMembership::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    put,
    path = "/groups/{group_slug}/members",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Membership set", body = GroupMembership),
        (status = 403, description = "MANAGE permission on the group required"),
        (status = 404, description = "Group not found"),
        (status = 422, description = "Would leave the group without a manager")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_membership(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
    Json(payload): Json<MembershipRequest>,
) -> AppResult<Json<GroupMembership>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    let actor_id = require_group_permission(&store, &principal, &group, Permission::Manage).await?;

    let permissions = PermissionSet::from(payload.permissions);
    let existing = store.user_by_username_or_email(&payload.username_or_email).await?;

    // the invite row and the membership write land together or not at all
    let mut tx = state.pool.begin().await?;
    let (user, invited) = match existing {
        Some(user) => (user, false),
        // revoking from an unknown identifier never creates an invite
        None if permissions.is_empty() => {
            return Err(AppError::not_found("user not found"));
        }
        None => (invite_user(&mut tx, &payload.username_or_email).await?, true),
    };

    if !permissions.contains(Permission::Manage) {
        ensure_another_manager(&mut tx, group.id, user.id).await?;
    }

    if permissions.is_empty() {
        sqlx::query("DELETE FROM group_memberships WHERE group_id = ? AND user_id = ?")
            .bind(group.id.to_string())
            .bind(user.id.to_string())
            .execute(&mut *tx)
            .await?;
    } else {
        let now = utc_now();
        sqlx::query(
            "INSERT INTO group_memberships (group_id, user_id, permissions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(group_id, user_id) DO UPDATE SET \
                 permissions = excluded.permissions, \
                 updated_at = excluded.updated_at",
        )
        .bind(group.id.to_string())
        .bind(user.id.to_string())
        .bind(permissions.to_db())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    if invited {
        log_activity(&state.event_bus, "invited", Some(actor_id), &user);
    }

    // later reads in this request must observe the write
    cache
        .store(
            CacheKey::Membership { group_id: group.id, user_id: user.id },
            CacheValue::Permissions(permissions.clone()),
        )
        .await;

    let membership = GroupMembership {
        group_id: group.id,
        user_id: user.id,
        permissions: permissions.clone(),
    };

    let (template, context) = if invited {
        (templates::GROUP_INVITE, json!({ "group": group.slug, "invitedBy": actor_id }))
    } else if permissions.is_empty() {
        (templates::GROUP_MEMBERSHIP_REMOVED, json!({ "group": group.slug }))
    } else {
        (
            templates::GROUP_MEMBERSHIP_CHANGED,
            json!({ "group": group.slug, "permissions": permissions.to_string() }),
        )
    };
    state.notifier.notify(&user, template, &context).await;

    let action = if permissions.is_empty() { "removed" } else { "updated" };
    log_activity(&state.event_bus, action, Some(actor_id), &membership);

    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    path = "/groups/{group_slug}/members/{username}",
    tag = "Groups",
    params(
        ("group_slug" = String, Path, description = "Group slug"),
        ("username" = String, Path, description = "Member username or email")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "MANAGE permission on the group required"),
        (status = 404, description = "Group or member not found"),
        (status = 422, description = "Would leave the group without a manager")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((group_slug, username)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;

    let user = store
        .user_by_username_or_email(&username)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    // members may leave on their own; removing anyone else needs MANAGE
    let actor_id = if principal.user_id() == Some(user.id) {
        user.id
    } else {
        require_group_permission(&store, &principal, &group, Permission::Manage).await?
    };

    let mut tx = state.pool.begin().await?;
    ensure_another_manager(&mut tx, group.id, user.id).await?;

    let result = sqlx::query("DELETE FROM group_memberships WHERE group_id = ? AND user_id = ?")
        .bind(group.id.to_string())
        .bind(user.id.to_string())
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("membership not found"));
    }
    tx.commit().await?;

    cache
        .store(
            CacheKey::Membership { group_id: group.id, user_id: user.id },
            CacheValue::Permissions(PermissionSet::new()),
        )
        .await;

    let membership = GroupMembership {
        group_id: group.id,
        user_id: user.id,
        permissions: PermissionSet::new(),
    };
    state
        .notifier
        .notify(&user, templates::GROUP_MEMBERSHIP_REMOVED, &json!({ "group": group.slug }))
        .await;
    log_activity(&state.event_bus, "removed", Some(actor_id), &membership);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/groups/{group_slug}/catalogs",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    responses(
        (status = 200, description = "Catalogs the group holds grants on, filtered to those the caller may view", body = [Catalog]),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_group_catalogs(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
) -> AppResult<Json<Vec<Catalog>>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    require_group_permission(&store, &principal, &group, Permission::View).await?;

    let grants = store.grants_for_group(group.id, ResourceKind::Catalog).await?;
    if grants.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let filter = catalog_filter(&principal, Permission::View);
    let placeholders = grant_placeholders(grants.len());
    let sql = format!(
        "SELECT c.id, c.slug, c.display_name, c.creator_id, c.is_public, c.created_at, c.updated_at \
         FROM catalogs c \
         WHERE c.id IN ({placeholders}) AND {} ORDER BY c.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbCatalog>(&sql);
    for grant in &grants {
        query = query.bind(grant.resource_id.to_string());
    }
    for bind in &filter.binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(&state.pool).await?;
    let catalogs = rows
        .into_iter()
        .map(Catalog::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(catalogs))
}

#[utoipa::path(
    get,
    path = "/groups/{group_slug}/packages",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    responses(
        (status = 200, description = "Packages the group holds grants on, filtered to those the caller may view", body = [Package]),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_group_packages(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
) -> AppResult<Json<Vec<Package>>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    require_group_permission(&store, &principal, &group, Permission::View).await?;

    let grants = store.grants_for_group(group.id, ResourceKind::Package).await?;
    if grants.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let filter = package_filter(&principal, Permission::View);
    let placeholders = grant_placeholders(grants.len());
    let sql = format!(
        "SELECT p.id, p.catalog_id, p.slug, p.display_name, p.description, p.creator_id, \
                p.is_public, p.created_at, p.updated_at \
         FROM packages p \
         WHERE p.id IN ({placeholders}) AND {} ORDER BY p.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbPackage>(&sql);
    for grant in &grants {
        query = query.bind(grant.resource_id.to_string());
    }
    for bind in &filter.binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(&state.pool).await?;
    let packages = rows
        .into_iter()
        .map(Package::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(packages))
}

#[utoipa::path(
    get,
    path = "/groups/{group_slug}/collections",
    tag = "Groups",
    params(("group_slug" = String, Path, description = "Group slug")),
    responses(
        (status = 200, description = "Collections the group holds grants on, filtered to those the caller may view", body = [Collection]),
        (status = 404, description = "Group not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_group_collections(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(group_slug): Path<String>,
) -> AppResult<Json<Vec<Collection>>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    require_group_permission(&store, &principal, &group, Permission::View).await?;

    let grants = store.grants_for_group(group.id, ResourceKind::Collection).await?;
    if grants.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let filter = collection_filter(&principal, Permission::View);
    let placeholders = grant_placeholders(grants.len());
    let sql = format!(
        "SELECT c.id, c.slug, c.name, c.description, c.creator_id, c.is_public, \
                c.created_at, c.updated_at \
         FROM collections c \
         WHERE c.id IN ({placeholders}) AND {} ORDER BY c.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbCollection>(&sql);
    for grant in &grants {
        query = query.bind(grant.resource_id.to_string());
    }
    for bind in &filter.binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(&state.pool).await?;
    let collections = rows
        .into_iter()
        .map(Collection::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(collections))
}

fn grant_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[utoipa::path(
    put,
    path = "/groups/{group_slug}/catalogs/{catalog_slug}",
    tag = "Groups",
    params(
        ("group_slug" = String, Path, description = "Group slug"),
        ("catalog_slug" = String, Path, description = "Catalog slug")
    ),
    request_body = GroupGrantRequest,
    responses(
        (status = 200, description = "Grant set", body = GroupResourceGrant),
        (status = 403, description = "MANAGE permission on the catalog and EDIT on the group required"),
        (status = 404, description = "Group or catalog not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_catalog(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((group_slug, catalog_slug)): Path<(String, String)>,
    Json(payload): Json<GroupGrantRequest>,
) -> AppResult<Json<GroupResourceGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    let actor_id = require_group_permission(&store, &principal, &group, Permission::Edit).await?;

    let args = json!({ "catalogSlug": catalog_slug });
    let resource = Guard::catalog(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let permissions = PermissionSet::from(payload.permissions);
    let package_permissions = PermissionSet::from(payload.package_permissions);

    let grant = store
        .upsert_group_grant(group.id, &resource, &permissions, Some(&package_permissions))
        .await?;

    log_activity(&state.event_bus, "granted", Some(actor_id), &grant);

    Ok(Json(grant))
}

#[utoipa::path(
    put,
    path = "/groups/{group_slug}/packages/{catalog_slug}/{package_slug}",
    tag = "Groups",
    params(
        ("group_slug" = String, Path, description = "Group slug"),
        ("catalog_slug" = String, Path, description = "Catalog slug"),
        ("package_slug" = String, Path, description = "Package slug")
    ),
    request_body = GroupGrantRequest,
    responses(
        (status = 200, description = "Grant set", body = GroupResourceGrant),
        (status = 403, description = "MANAGE permission on the package and EDIT on the group required"),
        (status = 404, description = "Group or package not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_package(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((group_slug, catalog_slug, package_slug)): Path<(String, String, String)>,
    Json(payload): Json<GroupGrantRequest>,
) -> AppResult<Json<GroupResourceGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    let actor_id = require_group_permission(&store, &principal, &group, Permission::Edit).await?;

    let args = json!({ "catalogSlug": catalog_slug, "packageSlug": package_slug });
    let resource = Guard::package(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let permissions = PermissionSet::from(payload.permissions);
    let grant = store
        .upsert_group_grant(group.id, &resource, &permissions, None)
        .await?;

    log_activity(&state.event_bus, "granted", Some(actor_id), &grant);

    Ok(Json(grant))
}

#[utoipa::path(
    put,
    path = "/groups/{group_slug}/collections/{collection_slug}",
    tag = "Groups",
    params(
        ("group_slug" = String, Path, description = "Group slug"),
        ("collection_slug" = String, Path, description = "Collection slug")
    ),
    request_body = GroupGrantRequest,
    responses(
        (status = 200, description = "Grant set", body = GroupResourceGrant),
        (status = 403, description = "MANAGE permission on the collection and EDIT on the group required"),
        (status = 404, description = "Group or collection not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_collection(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((group_slug, collection_slug)): Path<(String, String)>,
    Json(payload): Json<GroupGrantRequest>,
) -> AppResult<Json<GroupResourceGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let group = store.group_by_slug(&group_slug).await?;
    let actor_id = require_group_permission(&store, &principal, &group, Permission::Edit).await?;

    let args = json!({ "collectionSlug": collection_slug });
    let resource = Guard::collection(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let permissions = PermissionSet::from(payload.permissions);
    let grant = store
        .upsert_group_grant(group.id, &resource, &permissions, None)
        .await?;

    log_activity(&state.event_bus, "granted", Some(actor_id), &grant);

    Ok(Json(grant))
}

/// Fail unless some other member of the group holds MANAGE. Runs inside the
/// caller's transaction so the check and the mutation are atomic.
async fn ensure_another_manager(
    tx: &mut Transaction<'_, Sqlite>,
    group_id: Uuid,
    user_id: Uuid,
) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM group_memberships \
         WHERE group_id = ? AND user_id != ? AND permissions LIKE ?)",
    )
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind("%\"MANAGE\"%")
    .fetch_one(&mut **tx)
    .await?;

    if exists {
        return Ok(());
    }

    // the target may not be a manager at all, in which case nothing is lost
    let target_manages: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM group_memberships \
         WHERE group_id = ? AND user_id = ? AND permissions LIKE ?)",
    )
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind("%\"MANAGE\"%")
    .fetch_one(&mut **tx)
    .await?;

    if target_manages {
        return Err(AppError::not_valid("a group must retain at least one manager"));
    }
    Ok(())
}

/// Insert a pending-invite user row for an unknown e-mail address. Runs in
/// the caller's transaction, so a failed membership write leaves no orphan
/// invite behind.
async fn invite_user(tx: &mut Transaction<'_, Sqlite>, identifier: &str) -> AppResult<User> {
    if !is_valid_email(identifier) {
        return Err(AppError::not_found("user not found"));
    }

    let now = utc_now();
    let user = User {
        id: Uuid::new_v4(),
        // placeholder until the invitee registers and picks a username
        username: identifier.to_string(),
        email: identifier.to_string(),
        pending_invite: true,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) \
         VALUES (?, ?, ?, NULL, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(user)
}
