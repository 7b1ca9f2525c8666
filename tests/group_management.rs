use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use depot::create_app;
use sqlx::SqlitePool;

async fn setup_app_with_pool() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let database_url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = depot::db::connect(&database_url).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    Ok((app, pool, dir))
}

async fn setup_app() -> Result<(Router, TempDir)> {
    let (app, _pool, dir) = setup_app_with_pool().await?;
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

async fn create_group(app: &Router, token: &str, slug: &str) -> Result<()> {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/groups",
            Some(token),
            Some(json!({ "slug": slug, "name": slug })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "group create failed: {body}");
    Ok(())
}

#[tokio::test]
async fn creator_becomes_sole_manager() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, body) = send(&app, request("GET", "/groups/data-team/members", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    let members = body.as_array().context("members not an array")?;
    assert_eq!(members.len(), 1);
    let permissions: Vec<&str> = members[0]["permissions"]
        .as_array()
        .context("permissions not an array")?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(permissions, vec!["VIEW", "EDIT", "MANAGE"]);

    Ok(())
}

#[tokio::test]
async fn last_manager_cannot_be_removed_or_demoted() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    // demotion of the only manager is refused
    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "owner", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "NOT_VALID");

    // so is leaving
    let (status, _) = send(
        &app,
        request("DELETE", "/groups/data-team/members/owner", Some(&owner), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // with a second manager in place both operations succeed
    register(&app, "backup", "backup@example.com").await?;
    send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "backup", "permissions": ["VIEW", "EDIT", "MANAGE"] })),
        )?,
    )
    .await?;

    let (status, _) = send(
        &app,
        request("DELETE", "/groups/data-team/members/owner", Some(&owner), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn unknown_email_becomes_a_pending_invite() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "new.analyst@example.com", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "invite failed: {body}");

    // the invitee can later register with the same email and keep the membership
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "username": "analyst",
                "email": "new.analyst@example.com",
                "password": "password123"
            })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "invitee registration failed: {body}");
    assert_eq!(body["user"]["pending_invite"], false);
    let token = body["token"].as_str().context("missing token")?.to_string();

    let (status, _) = send(&app, request("GET", "/groups/data-team", Some(&token), None)?).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn unknown_plain_username_is_not_found() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "nobody", "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RESOURCE_NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn only_managers_change_memberships() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let member = register(&app, "member", "member@example.com").await?;
    register(&app, "victim", "victim@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

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

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&member),
            Some(json!({ "usernameOrEmail": "victim", "permissions": ["MANAGE"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_AUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn members_may_leave_on_their_own() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let member = register(&app, "member", "member@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

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

    let (status, _) = send(
        &app,
        request("DELETE", "/groups/data-team/members/member", Some(&member), None)?,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // access through the group is gone
    let (status, _) = send(&app, request("GET", "/groups/data-team", Some(&member), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn duplicate_group_slug_conflicts() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/groups",
            Some(&owner),
            Some(json!({ "slug": "data-team", "name": "Impostor" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NOT_UNIQUE");

    Ok(())
}

#[tokio::test]
async fn groups_are_masked_like_resources() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    let outsider = register(&app, "outsider", "outsider@example.com").await?;
    create_group(&app, &owner, "secret-team").await?;

    // nonexistent group
    let (status, body) = send(&app, request("GET", "/groups/nope", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "RESOURCE_NOT_FOUND");

    // anonymous caller on an existing group
    let (status, body) = send(&app, request("GET", "/groups/secret-team", None, None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NOT_AUTHENTICATED");

    // authenticated non-member
    let (status, body) = send(&app, request("GET", "/groups/secret-team", Some(&outsider), None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NOT_AUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn revoking_an_unknown_email_never_invites() -> Result<()> {
    let (app, pool, _dir) = setup_app_with_pool().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/members",
            Some(&owner),
            Some(json!({ "usernameOrEmail": "ghost@example.com", "permissions": [] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "unexpected body: {body}");
    assert_eq!(body["error"], "RESOURCE_NOT_FOUND");

    // the failed membership write must not strand a pending-invite row
    let invites: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind("ghost@example.com")
        .fetch_one(&pool)
        .await?;
    assert_eq!(invites, 0);

    Ok(())
}

#[tokio::test]
async fn repeated_mutations_survive_activity_logging() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    register(&app, "member", "member@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    // every round publishes activity events that the listener writes back
    // while the next membership transaction is already running
    for round in 0..12 {
        let (status, body) = send(
            &app,
            request(
                "PUT",
                "/groups/data-team/members",
                Some(&owner),
                Some(json!({ "usernameOrEmail": "member", "permissions": ["VIEW"] })),
            )?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "round {round} add failed: {body}");

        let (status, body) = send(
            &app,
            request("DELETE", "/groups/data-team/members/member", Some(&owner), None)?,
        )
        .await?;
        assert_eq!(
            status,
            StatusCode::NO_CONTENT,
            "round {round} remove failed: {body}"
        );
    }

    Ok(())
}

#[tokio::test]
async fn group_grants_are_listable_per_resource_kind() -> Result<()> {
    let (app, _dir) = setup_app().await?;
    let owner = register(&app, "owner", "owner@example.com").await?;
    create_group(&app, &owner, "data-team").await?;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/catalogs",
            Some(&owner),
            Some(json!({ "slug": "noaa", "display_name": "NOAA" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/catalogs/noaa/packages",
            Some(&owner),
            Some(json!({ "slug": "daily-temp", "display_name": "Daily Temperature" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/collections",
            Some(&owner),
            Some(json!({ "slug": "climate", "name": "Climate" })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/catalogs/noaa",
            Some(&owner),
            Some(json!({ "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "catalog grant failed: {body}");
    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/packages/noaa/daily-temp",
            Some(&owner),
            Some(json!({ "permissions": ["VIEW", "EDIT"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "package grant failed: {body}");
    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/groups/data-team/collections/climate",
            Some(&owner),
            Some(json!({ "permissions": ["VIEW"] })),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "collection grant failed: {body}");

    let (status, body) = send(&app, request("GET", "/groups/data-team/catalogs", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    let slugs: Vec<&str> = body
        .as_array()
        .context("catalogs not an array")?
        .iter()
        .filter_map(|c| c["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["noaa"]);

    let (status, body) = send(&app, request("GET", "/groups/data-team/packages", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    let slugs: Vec<&str> = body
        .as_array()
        .context("packages not an array")?
        .iter()
        .filter_map(|p| p["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["daily-temp"]);

    let (status, body) = send(&app, request("GET", "/groups/data-team/collections", Some(&owner), None)?).await?;
    assert_eq!(status, StatusCode::OK);
    let slugs: Vec<&str> = body
        .as_array()
        .context("collections not an array")?
        .iter()
        .filter_map(|c| c["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["climate"]);

    Ok(())
}
