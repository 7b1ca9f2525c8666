use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use depot::create_app;

async fn setup_app() -> Result<(Router, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let database_url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = depot::db::connect(&database_url).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;
    Ok((app, dir))
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

fn post_json(uri: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn register_login_me_roundtrip() -> Result<()> {
    let (app, _dir) = setup_app().await?;

    let (status, body) = send(
        &app,
        post_json(
            "/auth/register",
            json!({ "username": "grace", "email": "grace@example.com", "password": "password123" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    assert_eq!(body["user"]["username"], "grace");
    assert_eq!(body["user"]["pending_invite"], false);

    let (status, body) = send(
        &app,
        post_json(
            "/auth/login",
            json!({ "email": "grace@example.com", "password": "password123" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    let token = body["token"].as_str().context("missing token")?;

    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "grace@example.com");

    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected() -> Result<()> {
    let (app, _dir) = setup_app().await?;

    send(
        &app,
        post_json(
            "/auth/register",
            json!({ "username": "grace", "email": "grace@example.com", "password": "password123" }),
        )?,
    )
    .await?;

    let (status, body) = send(
        &app,
        post_json(
            "/auth/login",
            json!({ "email": "grace@example.com", "password": "wrong-password" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NOT_AUTHENTICATED");

    Ok(())
}

#[tokio::test]
async fn duplicate_identity_conflicts() -> Result<()> {
    let (app, _dir) = setup_app().await?;

    let payload = json!({ "username": "grace", "email": "grace@example.com", "password": "password123" });
    send(&app, post_json("/auth/register", payload.clone())?).await?;

    let (status, body) = send(&app, post_json("/auth/register", payload)?).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NOT_UNIQUE");

    let (status, _) = send(
        &app,
        post_json(
            "/auth/register",
            json!({ "username": "grace", "email": "other@example.com", "password": "password123" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn short_passwords_are_rejected() -> Result<()> {
    let (app, _dir) = setup_app().await?;

    let (status, body) = send(
        &app,
        post_json(
            "/auth/register",
            json!({ "username": "grace", "email": "grace@example.com", "password": "short" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "NOT_VALID");

    Ok(())
}

#[tokio::test]
async fn me_requires_a_token() -> Result<()> {
    let (app, _dir) = setup_app().await?;

    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NOT_AUTHENTICATED");

    Ok(())
}
