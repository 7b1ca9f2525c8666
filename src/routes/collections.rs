use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::guard::Guard;
use crate::auth::visibility::collection_filter;
use crate::auth::{CacheHandle, Permission, PermissionSet, PermissionStore, Principal, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::collection::{
    Collection, CollectionCreateRequest, CollectionGrant, CollectionUpdateRequest, DbCollection,
    SetCollectionPermissionsRequest,
};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_collections).post(create_collection))
        .route(
            "/:collection_slug",
            get(get_collection).put(update_collection).delete(delete_collection),
        )
        .route("/:collection_slug/permissions", put(set_collection_permissions))
}

#[utoipa::path(
    get,
    path = "/collections",
    tag = "Collections",
    responses((status = 200, description = "Collections visible to the caller", body = [Collection]))
)]
pub async fn list_collections(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Collection>>> {
    let filter = collection_filter(&principal, Permission::View);
    let sql = format!(
        "SELECT c.id, c.slug, c.name, c.description, c.creator_id, c.is_public, \
                c.created_at, c.updated_at \
         FROM collections c WHERE {} ORDER BY c.slug",
        filter.clause
    );

    let mut query = sqlx::query_as::<_, DbCollection>(&sql);
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

#[utoipa::path(
    post,
    path = "/collections",
    tag = "Collections",
    request_body = CollectionCreateRequest,
    responses(
        (status = 201, description = "Collection created", body = Collection),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_collection(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    auth: AuthUser,
    Json(payload): Json<CollectionCreateRequest>,
) -> AppResult<(StatusCode, Json<Collection>)> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM collections WHERE slug = ?")
        .bind(&payload.slug)
        .fetch_one(&state.pool)
        .await?;
    if count > 0 {
        return Err(AppError::not_unique("collection slug already in use"));
    }

    let now = utc_now();
    let collection = Collection {
        id: Uuid::new_v4(),
        slug: payload.slug,
        name: payload.name,
        description: payload.description,
        creator_id: auth.user_id,
        is_public: payload.is_public,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO collections \
             (id, slug, name, description, creator_id, is_public, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(collection.id.to_string())
    .bind(&collection.slug)
    .bind(&collection.name)
    .bind(&collection.description)
    .bind(collection.creator_id.to_string())
    .bind(collection.is_public)
    .bind(collection.created_at)
    .bind(collection.updated_at)
    .execute(&state.pool)
    .await?;

    let store = PermissionStore::new(&state.pool, &cache);
    store
        .set_direct_grant(
            auth.user_id,
            &Resource::Collection(collection.clone()),
            &PermissionSet::all(),
            None,
        )
        .await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &collection);

    Ok((StatusCode::CREATED, Json(collection)))
}

#[utoipa::path(
    get,
    path = "/collections/{collection_slug}",
    tag = "Collections",
    params(("collection_slug" = String, Path, description = "Collection slug")),
    responses(
        (status = 200, description = "Collection", body = Collection),
        (status = 404, description = "Collection not found")
    )
)]
pub async fn get_collection(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(collection_slug): Path<String>,
) -> AppResult<Json<Collection>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "collectionSlug": collection_slug });

    Guard::collection(Permission::View)
        .run(&store, &principal, &args, |resource| async move {
            match resource {
                Resource::Collection(collection) => Ok(Json(collection)),
                _ => Err(AppError::internal("guard resolved an unexpected resource kind")),
            }
        })
        .await
}

#[utoipa::path(
    put,
    path = "/collections/{collection_slug}",
    tag = "Collections",
    params(("collection_slug" = String, Path, description = "Collection slug")),
    request_body = CollectionUpdateRequest,
    responses(
        (status = 200, description = "Collection updated", body = Collection),
        (status = 403, description = "EDIT permission required"),
        (status = 404, description = "Collection not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_collection(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(collection_slug): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CollectionUpdateRequest>,
) -> AppResult<Json<Collection>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "collectionSlug": collection_slug });

    let resource = Guard::collection(Permission::Edit)
        .authorize(&store, &principal, &args)
        .await?;
    let old = match resource {
        Resource::Collection(collection) => collection,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    let mut collection = old.clone();
    if let Some(name) = payload.name {
        collection.name = name;
    }
    if let Some(description) = payload.description {
        collection.description = Some(description);
    }
    if let Some(is_public) = payload.is_public {
        collection.is_public = is_public;
    }
    collection.updated_at = utc_now();

    sqlx::query(
        "UPDATE collections SET name = ?, description = ?, is_public = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&collection.name)
    .bind(&collection.description)
    .bind(collection.is_public)
    .bind(collection.updated_at)
    .bind(collection.id.to_string())
    .execute(&state.pool)
    .await?;

    crate::events::log_activity_with_context(
        &state.event_bus,
        "updated",
        principal.user_id(),
        &collection,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(collection))
}

#[utoipa::path(
    delete,
    path = "/collections/{collection_slug}",
    tag = "Collections",
    params(("collection_slug" = String, Path, description = "Collection slug")),
    responses(
        (status = 204, description = "Collection deleted"),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Collection not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_collection(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(collection_slug): Path<String>,
) -> AppResult<StatusCode> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "collectionSlug": collection_slug });

    let resource = Guard::collection(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;
    let collection = match resource {
        Resource::Collection(collection) => collection,
        _ => return Err(AppError::internal("guard resolved an unexpected resource kind")),
    };

    let mut tx = state.pool.begin().await?;
    let collection_id = collection.id.to_string();
    sqlx::query("DELETE FROM user_collection_permissions WHERE collection_id = ?")
        .bind(&collection_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM group_collection_permissions WHERE collection_id = ?")
        .bind(&collection_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM collections WHERE id = ?")
        .bind(&collection_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log_activity(&state.event_bus, "deleted", principal.user_id(), &collection);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/collections/{collection_slug}/permissions",
    tag = "Collections",
    params(("collection_slug" = String, Path, description = "Collection slug")),
    request_body = SetCollectionPermissionsRequest,
    responses(
        (status = 200, description = "Permissions set", body = CollectionGrant),
        (status = 403, description = "MANAGE permission required"),
        (status = 404, description = "Collection or user not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_collection_permissions(
    State(state): State<AppState>,
    Extension(cache): Extension<CacheHandle>,
    principal: Principal,
    Path(collection_slug): Path<String>,
    Json(payload): Json<SetCollectionPermissionsRequest>,
) -> AppResult<Json<CollectionGrant>> {
    let store = PermissionStore::new(&state.pool, &cache);
    let args = json!({ "collectionSlug": collection_slug });

    let resource = Guard::collection(Permission::Manage)
        .authorize(&store, &principal, &args)
        .await?;

    let user = store
        .user_by_username_or_email(&payload.username_or_email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let permissions = PermissionSet::from(payload.permissions);
    store.set_direct_grant(user.id, &resource, &permissions, None).await?;

    let grant = CollectionGrant {
        user_id: user.id,
        collection_id: resource.id(),
        permissions: permissions.clone(),
    };

    state
        .notifier
        .notify(
            &user,
            crate::notify::templates::PERMISSIONS_CHANGED,
            &json!({ "collection": resource.slug(), "permissions": permissions.to_string() }),
        )
        .await;

    log_activity(&state.event_bus, "granted", principal.user_id(), &grant);

    Ok(Json(grant))
}
