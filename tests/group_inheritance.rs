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

/// owner creates a private catalog with one package; member holds no direct
/// grants anywhere.
async fn seed_catalog_and_package(app: &Router, owner: &str) -> Result<()> {
    let (status, _) = send(
        app,
        request(
            "POST",
            "/catalogs",
            Some(owner),
            Some(json!({ "slug": "noaa", "display_name": "NOAA", "is_public": false })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        app,
        request(
            "POST",
            "/catalogs/noaa/packages",
            Some(owner),
            Some(json!({ "slug": "daily-temp", "display_name": "Daily Temperature" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn group_grant_reaches_members() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let member = register(&app, "member", "member@example.com").await?;

    seed_catalog_and_package(&app, &owner).await?;

    // owner creates a group and adds the member
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/groups",
            Some(&owner),
            Some(json!({ "slug": "data-team", "name": "Data Team" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "member", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;

    // before the group holds a grant, the member sees nothing
    let (status, _) = send(&app, request("GET", "/catalogs/noaa", Some(&member), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/catalogs/noaa",
            Some(&owner),
            Some(json!({ "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // membership now carries the group's grant
    let (status, body) = send(&app, request("GET", "/catalogs/noaa", Some(&member), None)?).await?;
    assert_eq!(status, StatusCode::OK, "member denied: {body}");

    Ok(())
}

#[tokio::test]
async fn catalog_package_permissions_cascade_to_packages() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let analyst = register(&app, "analyst", "analyst@example.com").await?;

    seed_catalog_and_package(&app, &owner).await?;

    // direct catalog grant with a package cascade, no package-level grant
    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/catalogs/noaa/permissions",
            Some(&owner),
            Some(json!({
                "usernameOrEmail": "analyst",
                "permissions": ["VIEW"],
                "packagePermissions": ["VIEW"]
            })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", "/catalogs/noaa/packages/daily-temp", Some(&analyst), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "cascade failed: {body}");
    assert_eq!(body["slug"], "daily-temp");

    // the cascade carries VIEW, not EDIT
    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/catalogs/noaa/packages/daily-temp",
            Some(&analyst),
            Some(json!({ "display_name": "Renamed" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn group_catalog_cascade_reaches_member_packages() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let member = register(&app, "member", "member@example.com").await?;

    seed_catalog_and_package(&app, &owner).await?;

    send(
        &app,
        request(
            "POST",
            "/groups",
            Some(&owner),
            Some(json!({ "slug": "readers", "name": "Readers" })),
        )?,
    )
    .await?;
    send(
        &app,
        request(
            "PUT",
            "/groups/readers/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "member", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;

    // group grant on the catalog cascades into its packages
    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/groups/readers/catalogs/noaa",
            Some(&owner),
            Some(json!({ "permissions": ["VIEW"], "packagePermissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", "/catalogs/noaa/packages/daily-temp", Some(&member), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "group cascade failed: {body}");

    Ok(())
}

#[tokio::test]
async fn package_grants_union_across_sources() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let editor = register(&app, "editor", "editor@example.com").await?;

    seed_catalog_and_package(&app, &owner).await?;

    // VIEW arrives via the catalog cascade, EDIT directly on the package
    send(
        &app,
        request(
            "PUT",
            "/catalogs/noaa/permissions",
            Some(&owner),
            Some(json!({
                "usernameOrEmail": "editor",
                "permissions": ["VIEW"],
                "packagePermissions": ["VIEW"]
            })),
        )?,
    )
    .await?;
    send(
        &app,
        request(
            "PUT",
            "/catalogs/noaa/packages/daily-temp/permissions",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "editor", "permissions": ["EDIT"] })),
        )?,
    )
    .await?;

    // both levels are usable at once
    let (status, _) = send(
        &app,
        request("GET", "/catalogs/noaa/packages/daily-temp", Some(&editor), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/catalogs/noaa/packages/daily-temp",
            Some(&editor),
            Some(json!({ "display_name": "Renamed" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "union failed: {body}");

    Ok(())
}
