use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::guard::Guard;
use crate::auth::visibility::catalog_filter;
use crate::auth::{CacheHandle, Permission, PermissionSet, PermissionStore, Principal, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::catalog::{
    Catalog, CatalogCreateRequest, CatalogGrant, CatalogUpdateRequest, DbCatalog,
    SetCatalogPermissionsRequest,
};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_catalogs).post(create_catalog))
        .route(
            "/:catalog_slug",
            get(get_catalog).put(update_catalog).delete(delete_catalog),
        )
        .route("/:catalog_slug/permissions", put(set_catalog_permissions))
}

#[utoipa::path(
    get,
    path = "/catalogs",
    tag = "Catalogs",
    responses((status = 200, description = "Catalogs visible to the caller", body = [Catalog]))
)]
pub async fn list_catalogs(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Catalog>>> {
    let filter = catalog_filter(&principal, Permission::View);
    let sql = format!(
        "SELECT c.id, c.slug, c.display_name, c.creator_id, c.is_public, c.created_at, c.updated_at \
         FROM catalogs c WHERE {} ORDER BY c.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbCatalog>(&sql);
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
    post,
    path = "/catalogs",
    tag = "Catalogs",
    request_body = CatalogCreateRequest,
    responses(
        (status = 201, description = "Catalog created", body = Catalog),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_catalog(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    auth: AuthUser,
    Json(payload): Json<CatalogCreateRequest>,
) -> AppResult<(StatusCode, Json<Catalog>)> {
    ensure_slug_available(&state, &payload.slug).await?;

    let now = utc_now();
    let catalog = Catalog {
        id: Uuid::new_v4(),
        slug: payload.slug,
        display_name: payload.display_name,
        creator_id: auth.user_id,
        is_public: payload.is_public,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO catalogs (id, slug, display_name, creator_id, is_public, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(catalog.id.to_string())
    .bind(&catalog.slug)
    .bind(&catalog.display_name)
    .bind(catalog.creator_id.to_string())
    .bind(catalog.is_public)
    .bind(catalog.created_at)
    .bind(catalog.updated_at)
    .execute(&state.pool)
    .await?;

    // the creator starts with every permission, cascading to future packages
    let store = PermissionStore::new(&state.pool, &cache);
    store
        .set_direct_grant(
            auth.user_id,
            &Resource::Catalog(catalog.clone()),
            &PermissionSet::all(),
            Some(&PermissionSet::all()),
        )
        .await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &catalog);

    Ok((StatusCode::CREATED, Json(catalog)))
}

#[utoipa::path(
    get,
    path = "/catalogs/{catalog_slug}",
    tag = "Catalogs",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    responses(
        (status = 200, description = "Catalog", body = Catalog),
        (status = 404, description = "Catalog not found")
    )
)]
pub async fn get_catalog(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(catalog_slug): Path<String>,
) -> AppResult<Json<Catalog>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug });

    Guard::catalog(Permission::View)
        .run(&store, &principal, &args, |resource| async move {
            match resource {
                Resource::Catalog(catalog) => Ok(Json(catalog)),
                _ => Err(AppError::internal("guard resolved an unexpected resource kind")),
            }
        })
        .await
}

#[utoipa::path(
    put,
    path = "/catalogs/{catalog_slug}",
    tag = "Catalogs",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    request_body = CatalogUpdateRequest,
    responses(
        (status = 200, description = "Catalog updated", body = Catalog),
        (status = 403, description = "EDIT permission required"),
        (status = 404, description = "Catalog not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_catalog(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(catalog_slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CatalogUpdateRequest>,
) -> AppResult<Json<Catalog>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug });

    let resource = Guard::catalog(Permission::Edit)
        .authorize(&store, &principal, &args)
        .await?;
    let old = match resource {
        Resource::Catalog(catalog) => catalog,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    let mut catalog = old.clone();
    if let Some(display_name) = payload.display_name {
        catalog.display_name = display_name;
    }
    if let Some(is_public) = payload.is_public {
        catalog.is_public = is_public;
    }
    catalog.updated_at = utc_now();

    sqlx::query("UPDATE catalogs SET display_name = ?, is_public = ?, updated_at = ? WHERE id = ?")
        .bind(&catalog.display_name)
        .bind(catalog.is_public)
        .bind(catalog.updated_at)
        .bind(catalog.id.to_string())
        .execute(&state.pool)
        .await?;

    crate::events::log_activity_with_context(
        &state.event_bus,
        "updated",
        principal.user_id(),
        &catalog,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(catalog))
}

#[utoipa::path(
    delete,
    path = "/catalogs/{catalog_slug}",
    tag = "Catalogs",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    responses(
        (status = 204, description = "Catalog deleted"),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Catalog not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_catalog(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(catalog_slug): Path<String>,
) -> AppResult<StatusCode> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug });

    let resource = Guard::catalog(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;
    let catalog = match resource {
        Resource::Catalog(catalog) => catalog,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    // packages and grants go with the catalog
    let mut tx = state.pool.begin().await?;
    let catalog_id = catalog.id.to_string();
    sqlx::query(
        "DELETE FROM user_package_permissions WHERE package_id IN \
         (SELECT id FROM packages WHERE catalog_id = ?)",
    )
    .bind(&catalog_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM group_package_permissions WHERE package_id IN \
         (SELECT id FROM packages WHERE catalog_id = ?)",
    )
    .bind(&catalog_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM packages WHERE catalog_id = ?")
        .bind(&catalog_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM user_catalog_permissions WHERE catalog_id = ?")
        .bind(&catalog_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM group_catalog_permissions WHERE catalog_id = ?")
        .bind(&catalog_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM catalogs WHERE id = ?")
        .bind(&catalog_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity(&state.event_bus, "deleted", principal.user_id(), &catalog);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/catalogs/{catalog_slug}/permissions",
    tag = "Catalogs",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    request_body = SetCatalogPermissionsRequest,
    responses(
        (status = 200, description = "Permissions set", body = CatalogGrant),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Catalog or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_catalog_permissions(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(catalog_slug): Path<String>,
    Json(payload): Json<SetCatalogPermissionsRequest>,
) -> AppResult<Json<CatalogGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug });

    let resource = Guard::catalog(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let user = store
        .user_by_username_or_email(&payload.username_or_email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let permissions = PermissionSet::from(payload.permissions);
    let package_permissions = PermissionSet::from(payload.package_permissions);

    store
        .set_direct_grant(user.id, &resource, &permissions, Some(&package_permissions))
        .await?;

    let grant = CatalogGrant {
        user_id: user.id,
        catalog_id: resource.id(),
        permissions: permissions.clone(),
        package_permissions,
    };

    state
        .notifier
        .notify(
            &user,
            crate::notify::templates::PERMISSIONS_CHANGED,
            &json!({ "catalog": resource.slug(), "permissions": permissions.to_string() }),
        )
        .await;

    log_activity(&state.event_bus, "granted", principal.user_id(), &grant);

    Ok(Json(grant))
}

async fn ensure_slug_available(state: &AppState, slug: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM catalogs WHERE slug = ?")
        .bind(slug)
        .fetch_one(&state.pool)
        .await?;
    if count > 0 {
        return Err(AppError::not_unique("catalog slug already in use"));
    }
    Ok(())
}
