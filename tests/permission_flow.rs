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

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    Ok(builder.body(body)?)
}

async fn register(app: &Router, username: &str, email: &str) -> Result<String> {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": username, "email": email, "password": "password123" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("missing token")
}

#[tokio::test]
async fn direct_grant_opens_exactly_the_granted_level() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let reader = register(&app, "reader", "reader@example.com").await?;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/catalogs",
            Some(&owner),
            Some(json!({ "slug": "climate", "display_name": "Climate", "is_public": false })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    // no grant yet: the catalog exists but is invisible to the reader
    let (status, body) = send(&app, request("GET", "/catalogs/climate", Some(&reader), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_AUTHORIZED");

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/catalogs/climate/permissions",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "reader", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/catalogs/climate", Some(&reader), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slug"], "climate");

    // VIEW does not imply EDIT
    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/catalogs/climate",
            Some(&reader),
            Some(json!({ "display_name": "Hijacked" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_AUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn revoking_a_grant_closes_access() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let reader = register(&app, "reader", "reader@example.com").await?;

    send(
        &app,
        request(
            "POST",
            "/catalogs",
            Some(&owner),
            Some(json!({ "slug": "climate", "display_name": "Climate" })),
        )?,
    )
    .await?;
    send(
        &app,
        request(
            "PUT",
            "/catalogs/climate/permissions",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "reader", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;

    let (status, _) = send(&app, request("GET", "/catalogs/climate", Some(&reader), None)?).await?;
    assert_eq!(status, StatusCode::OK);

    // empty permission list revokes
    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/catalogs/climate/permissions",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "reader", "permissions": [] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, request("GET", "/catalogs/climate", Some(&reader), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn masking_policy_distinguishes_missing_from_forbidden() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let outsider = register(&app, "outsider", "outsider@example.com").await?;

    send(
        &app,
        request(
            "POST",
            "/catalogs",
            Some(&owner),
            Some(json!({ "slug": "private", "display_name": "Private", "is_public": false })),
        )?,
    )
    .await?;

    // nonexistent resource: 404 regardless of who asks
    let (status, body) = send(&app, request("GET", "/catalogs/nope", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RESOURCE_NOT_FOUND");

    // existing but forbidden: anonymous is asked to authenticate
    let (status, body) = send(&app, request("GET", "/catalogs/private", None, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NOT_AUTHENTICATED");

    // existing but forbidden: an authenticated outsider is denied
    let (status, body) = send(&app, request("GET", "/catalogs/private", Some(&outsider), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_AUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn creator_holds_manage_on_a_new_catalog() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;

    send(
        &app,
        request(
            "POST",
            "/catalogs",
            Some(&owner),
            Some(json!({ "slug": "mine", "display_name": "Mine" })),
        )?,
    )
    .await?;

    // MANAGE lets the creator edit and grant
    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/catalogs/mine",
            Some(&owner),
            Some(json!({ "display_name": "Renamed" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Renamed");

    let (status, _) = send(&app, request("DELETE", "/catalogs/mine", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", "/catalogs/mine", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn duplicate_catalog_slug_conflicts() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;

    let payload = json!({ "slug": "dup", "display_name": "First" });
    let (status, _) = send(&app, request("POST", "/catalogs", Some(&owner), Some(payload.clone()))?).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, request("POST", "/catalogs", Some(&owner), Some(payload))?).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NOT_UNIQUE");

    Ok(())
}
