use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::guard::Guard;
use crate::auth::visibility::package_filter;
use crate::auth::{CacheHandle, Permission, PermissionSet, PermissionStore, Principal, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::package::{
    DbPackage, Package, PackageCreateRequest, PackageGrant, PackageUpdateRequest,
    SetPackagePermissionsRequest,
};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_packages).post(create_package))
        .route(
            "/:package_slug",
            get(get_package).put(update_package).delete(delete_package),
        )
        .route("/:package_slug/permissions", put(set_package_permissions))
}

#[utoipa::path(
    get,
    path = "/catalogs/{catalog_slug}/packages",
    tag = "Packages",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    responses(
        (status = 200, description = "Packages visible to the caller", body = [Package]),
        (status = 404, description = "Catalog not found")
    )
)]
pub async fn list_packages(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(catalog_slug): Path<String>,
) -> AppResult<Json<Vec<Package>>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let catalog = store.catalog_by_slug(&catalog_slug).await?;

    let filter = package_filter(&principal, Permission::View);
    let sql = format!(
        "SELECT p.id, p.catalog_id, p.slug, p.display_name, p.description, p.creator_id, \
                p.is_public, p.created_at, p.updated_at \
         FROM packages p WHERE p.catalog_id = ? AND {} ORDER BY p.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbPackage>(&sql).bind(catalog.id.to_string());
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
    post,
    path = "/catalogs/{catalog_slug}/packages",
    tag = "Packages",
    params(("catalog_slug" = String, Path, description = "Catalog slug")),
    request_body = PackageCreateRequest,
    responses(
        (status = 201, description = "Package created", body = Package),
        (status = 403, description = "EDIT permission on the catalog required"),
        (status = 409, description = "Slug already in use within the catalog")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_package(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    auth: AuthUser,
    Path(catalog_slug): Path<String>,
    Json(payload): Json<PackageCreateRequest>,
) -> AppResult<(StatusCode, Json<Package>)> {
    let store = PermissionStore::new(&state.pool, &cache);
    let principal = Principal::User(auth.user_id);
    let args = json!({ "catalogSlug": catalog_slug });

    // creating inside a catalog is an edit of that catalog
    let catalog = Guard::catalog(Permission::Edit)
        .authorize(&store, &principal, &args)
        .await?;

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM packages WHERE catalog_id = ? AND slug = ?")
            .bind(catalog.id().to_string())
            .bind(&payload.slug)
            .fetch_one(&state.pool)
            .await?;
    if count > 0 {
        return Err(AppError::not_unique("package slug already in use in this catalog"));
    }

    let now = utc_now();
    let package = Package {
        id: Uuid::new_v4(),
        catalog_id: catalog.id(),
        slug: payload.slug,
        display_name: payload.display_name,
        description: payload.description,
        creator_id: auth.user_id,
        is_public: payload.is_public,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO packages \
             (id, catalog_id, slug, display_name, description, creator_id, is_public, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(package.id.to_string())
    .bind(package.catalog_id.to_string())
    .bind(&package.slug)
    .bind(&package.display_name)
    .bind(&package.description)
    .bind(package.creator_id.to_string())
    .bind(package.is_public)
    .bind(package.created_at)
    .bind(package.updated_at)
    .execute(&state.pool)
    .await?;

    store
        .set_direct_grant(
            auth.user_id,
            &Resource::Package(package.clone()),
            &PermissionSet::all(),
            None,
        )
        .await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &package);

    Ok((StatusCode::CREATED, Json(package)))
}

#[utoipa::path(
    get,
    path = "/catalogs/{catalog_slug}/packages/{package_slug}",
    tag = "Packages",
    params(
        ("catalog_slug" = String, Path, description = "Catalog slug"),
        ("package_slug" = String, Path, description = "Package slug")
    ),
    responses(
        (status = 200, description = "Package", body = Package),
        (status = 404, description = "Package not found")
    )
)]
pub async fn get_package(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((catalog_slug, package_slug)): Path<(String, String)>,
) -> AppResult<Json<Package>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug, "packageSlug": package_slug });

    Guard::package(Permission::View)
        .run(&store, &principal, &args, |resource| async move {
            match resource {
                Resource::Package(package) => Ok(Json(package)),
                _ => Err(AppError::internal("guard resolved an unexpected resource kind")),
            }
        })
        .await
}

#[utoipa::path(
    put,
    path = "/catalogs/{catalog_slug}/packages/{package_slug}",
    tag = "Packages",
    params(
        ("catalog_slug" = String, Path, description = "Catalog slug"),
        ("package_slug" = String, Path, description = "Package slug")
    ),
    request_body = PackageUpdateRequest,
    responses(
        (status = 200, description = "Package updated", body = Package),
        (status = 403, description = "EDIT permission required"),
        (status = 404, description = "Package not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_package(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((catalog_slug, package_slug)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<PackageUpdateRequest>,
) -> AppResult<Json<Package>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug, "packageSlug": package_slug });

    let resource = Guard::package(Permission::Edit)
        .authorize(&store, &principal, &args)
        .await?;
    let old = match resource {
        Resource::Package(package) => package,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    let mut package = old.clone();
    if let Some(display_name) = payload.display_name {
        package.display_name = display_name;
    }
    if let Some(description) = payload.description {
        package.description = Some(description);
    }
    if let Some(is_public) = payload.is_public {
        package.is_public = is_public;
    }
    package.updated_at = utc_now();

    sqlx::query(
        "UPDATE packages SET display_name = ?, description = ?, is_public = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&package.display_name)
    .bind(&package.description)
    .bind(package.is_public)
    .bind(package.updated_at)
    .bind(package.id.to_string())
    .execute(&state.pool)
    .await?;

    crate::events::log_activity_with_context(
        &state.event_bus,
        "updated",
        principal.user_id(),
        &package,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(package))
}

#[utoipa::path(
    delete,
    path = "/catalogs/{catalog_slug}/packages/{package_slug}",
    tag = "Packages",
    params(
        ("catalog_slug" = String, Path, description = "Catalog slug"),
        ("package_slug" = String, Path, description = "Package slug")
    ),
    responses(
        (status = 204, description = "Package deleted"),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Package not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_package(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((catalog_slug, package_slug)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug, "packageSlug": package_slug });

    let resource = Guard::package(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;
    let package = match resource {
        Resource::Package(package) => package,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    let mut tx = state.pool.begin().await?;
    let package_id = package.id.to_string();
    sqlx::query("DELETE FROM user_package_permissions WHERE package_id = ?")
        .bind(&package_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM group_package_permissions WHERE package_id = ?")
        .bind(&package_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM packages WHERE id = ?")
        .bind(&package_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity(&state.event_bus, "deleted", principal.user_id(), &package);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/catalogs/{catalog_slug}/packages/{package_slug}/permissions",
    tag = "Packages",
    params(
        ("catalog_slug" = String, Path, description = "Catalog slug"),
        ("package_slug" = String, Path, description = "Package slug")
    ),
    request_body = SetPackagePermissionsRequest,
    responses(
        (status = 200, description = "Permissions set", body = PackageGrant),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Package or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_package_permissions(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path((catalog_slug, package_slug)): Path<(String, String)>,
    Json(payload): Json<SetPackagePermissionsRequest>,
) -> AppResult<Json<PackageGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "catalogSlug": catalog_slug, "packageSlug": package_slug });

    let resource = Guard::package(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let user = store
        .user_by_username_or_email(&payload.username_or_email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let permissions = PermissionSet::from(payload.permissions);
    store.set_direct_grant(user.id, &resource, &permissions, None).await?;

    let grant = PackageGrant {
        user_id: user.id,
        package_id: resource.id(),
        permissions: permissions.clone(),
    };

    state
        .notifier
        .notify(
            &user,
            crate::notify::templates::PERMISSIONS_CHANGED,
            &json!({ "package": resource.slug(), "permissions": permissions.to_string() }),
        )
        .await;

    log_activity(&state.event_bus, "granted", principal.user_id(), &grant);

    Ok(Json(grant))
}
