use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs; drives retention policy downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that appear in the activity log.
/// Implement on a model to enable declarative activity logging.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name (e.g. "group", "catalog"); becomes the prefix
    /// in event names like "group.created".
    fn entity_type() -> &'static str;

    /// The subject id (usually the entity's primary key).
    fn subject_id(&self) -> Uuid;

    /// Severity level for logs (defaults to Important).
    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action (e.g. "deleted" -> Critical).
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "removed" => Severity::Critical,
            "created" | "updated" | "granted" | "revoked" => self.severity(),
            _ => Severity::Important,
        }
    }
}
