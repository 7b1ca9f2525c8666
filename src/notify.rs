//! Notification sink for membership changes.
//!
//! Delivery (e-mail or otherwise) lives outside this service; the core only
//! owns the call contract. Failures are logged and swallowed so they never
//! affect the mutation that triggered them.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::user::User;

/// Message templates understood by the downstream delivery system.
pub mod templates {
    pub const GROUP_INVITE: &str = "group-invite";
    pub const GROUP_MEMBERSHIP_CHANGED: &str = "group-membership-changed";
    pub const GROUP_MEMBERSHIP_REMOVED: &str = "group-membership-removed";
    pub const PERMISSIONS_CHANGED: &str = "permissions-changed";
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &User, template: &str, context: &Value);
}

/// Default sink: records the notification in the service log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user: &User, template: &str, context: &Value) {
        tracing::info!(
            user = %user.username,
            email = %user.email,
            template = %template,
            context = %context,
            "notification queued"
        );
    }
}
