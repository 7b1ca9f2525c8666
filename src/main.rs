use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use depot::{models, routes};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::catalogs::list_catalogs,
        routes::catalogs::create_catalog,
        routes::catalogs::get_catalog,
        routes::catalogs::update_catalog,
        routes::catalogs::delete_catalog,
        routes::catalogs::set_catalog_permissions,
        routes::packages::list_packages,
        routes::packages::create_package,
        routes::packages::get_package,
        routes::packages::update_package,
        routes::packages::delete_package,
        routes::packages::set_package_permissions,
        routes::collections::list_collections,
        routes::collections::create_collection,
        routes::collections::get_collection,
        routes::collections::update_collection,
        routes::collections::delete_collection,
        routes::collections::set_collection_permissions,
        routes::groups::create_group,
        routes::groups::get_group,
        routes::groups::list_members,
        routes::groups::set_membership,
        routes::groups::remove_member,
        routes::groups::list_group_catalogs,
        routes::groups::list_group_packages,
        routes::groups::list_group_collections,
        routes::groups::grant_catalog,
        routes::groups::grant_package,
        routes::groups::grant_collection
    ),
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::catalog::Catalog,
            models::catalog::CatalogCreateRequest,
            models::catalog::CatalogUpdateRequest,
            models::catalog::SetCatalogPermissionsRequest,
            models::catalog::CatalogGrant,
            models::package::Package,
            models::package::PackageCreateRequest,
            models::package::PackageUpdateRequest,
            models::package::SetPackagePermissionsRequest,
            models::package::PackageGrant,
            models::collection::Collection,
            models::collection::CollectionCreateRequest,
            models::collection::CollectionUpdateRequest,
            models::collection::SetCollectionPermissionsRequest,
            models::collection::CollectionGrant,
            models::group::Group,
            models::group::GroupCreateRequest,
            models::group::GroupMembership,
            models::group::GroupResourceGrant,
            models::group::MembershipRequest,
            models::group::GroupGrantRequest,
            depot::auth::Permission,
            depot::auth::PermissionSet
        )
    ),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Catalogs", description = "Catalog management and permissions"),
        (name = "Packages", description = "Package management and permissions"),
        (name = "Collections", description = "Collection management and permissions"),
        (name = "Groups", description = "Group and membership management")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = depot::db::init().await?;
    let app = depot::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
