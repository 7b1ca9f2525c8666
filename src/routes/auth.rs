use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::utils::{hash_password, utc_now, verify_password};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Username or email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();

    // An invited user completes registration by claiming the pending row.
    let pending = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, created_at, updated_at \
         FROM users WHERE email = ? AND password_hash IS NULL",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?;

    let user_id = if let Some(invited) = pending {
        ensure_username_available(&state.pool, &payload.username).await?;
        sqlx::query("UPDATE users SET username = ?, password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&payload.username)
            .bind(&password_hash)
            .bind(now)
            .bind(&invited.id)
            .execute(&state.pool)
            .await?;
        crate::models::parse_uuid(&invited.id, "user id")?
    } else {
        ensure_identity_available(&state.pool, &payload.username, &payload.email).await?;
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(&payload.username)
        .bind(&payload.email)
        .bind(&password_hash)
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await?;
        user_id
    };

    let user = fetch_user(&state.pool, user_id).await?;
    let token = state.jwt.encode(user.id)?;

    log_activity(&state.event_bus, "registered", Some(user.id), &user);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, created_at, updated_at \
         FROM users WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_authenticated("invalid credentials"))?;

    // pending invites have no password yet
    let password_hash = db_user
        .password_hash
        .clone()
        .ok_or_else(|| AppError::not_authenticated("invalid credentials"))?;

    if !verify_password(&payload.password, &password_hash)? {
        return Err(AppError::not_authenticated("invalid credentials"));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    log_activity(&state.event_bus, "login", Some(user.id), &user);

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = fetch_user(&state.pool, auth.user_id).await?;
    Ok(Json(user))
}

async fn ensure_username_available(pool: &SqlitePool, username: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Err(AppError::not_unique("username already in use"));
    }
    Ok(())
}

async fn ensure_identity_available(pool: &SqlitePool, username: &str, email: &str) -> AppResult<()> {
    ensure_username_available(pool, username).await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Err(AppError::not_unique("email already in use"));
    }
    Ok(())
}

pub(crate) async fn fetch_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<User> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, username, email, password_hash, created_at, updated_at \
         FROM users WHERE id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))?;

    db_user.try_into()
}
