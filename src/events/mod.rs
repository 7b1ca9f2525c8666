//! Activity logging side channel.
//!
//! Mutating operations publish domain events on a broadcast bus; a
//! background listener projects them into the `activity_log` table. The
//! channel is fire-and-forget: a full bus or a failed insert never rolls
//! back the mutation that produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(name: String, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context captured alongside activity entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Structured activity payload: new state, optional old state, context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Publish an activity event for an entity implementing [`Loggable`].
/// Fire-and-forget: send failures are ignored by design.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

/// Variant carrying the previous entity state and the request context.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> String {
    match name {
        "group.created" => "Group created",
        "group.deleted" => "Group deleted",
        "group_membership.updated" => "Group membership updated",
        "group_membership.removed" => "Group membership removed",
        "group_grant.granted" => "Group resource grant updated",
        "catalog.created" => "Catalog created",
        "catalog.updated" => "Catalog updated",
        "catalog.deleted" => "Catalog deleted",
        "catalog_grant.granted" => "Catalog permissions updated",
        "package.created" => "Package created",
        "package.updated" => "Package updated",
        "package.deleted" => "Package deleted",
        "package_grant.granted" => "Package permissions updated",
        "collection.created" => "Collection created",
        "collection.updated" => "Collection updated",
        "collection.deleted" => "Collection deleted",
        "collection_grant.granted" => "Collection permissions updated",
        "user.registered" => "New user registered",
        "user.invited" => "User invited",
        "user.login" => "User logged in",
        _ => "System event",
    }
    .to_string()
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        let event_json = event.clone();

        // tolerant extraction; a malformed event is still recorded
        let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
        let actor_id = event
            .get("actor_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let subject_id = event
            .get("subject_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        let occurred_at = event
            .get("occurred_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let severity = event
            .get("payload")
            .and_then(|p| p.get("severity"))
            .and_then(|s| s.as_str())
            .unwrap_or("important");

        let result = sqlx::query(
            "INSERT INTO activity_log \
                 (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(describe(name))
        .bind(actor_id.map(|u| u.to_string()))
        .bind(subject_id.map(|u| u.to_string()))
        .bind(occurred_at)
        .bind(event_json.to_string())
        .bind(severity)
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::error!("failed to save activity log: {}", e);
        }
    }
}
