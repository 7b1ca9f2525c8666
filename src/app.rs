use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::cache::RequestCache;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::notify::{Notifier, TracingNotifier};
use crate::routes::{auth, catalogs, collections, groups, packages};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
            notifier,
        }
    }
}

/// Every request gets one fresh [`RequestCache`]; it is dropped with the
/// request, which is the cache's entire eviction policy.
async fn attach_request_cache(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(RequestCache::handle());
    next.run(req).await
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus, Arc::new(TracingNotifier));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .nest("/auth", auth::routes())
        .nest("/catalogs", catalogs::routes())
        // packages are addressed through their catalog
        .nest("/catalogs/:catalog_slug/packages", packages::routes())
        .nest("/collections", collections::routes())
        .nest("/groups", groups::routes())
        .layer(middleware::from_fn(attach_request_cache))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
