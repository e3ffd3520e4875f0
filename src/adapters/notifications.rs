// Notification summary over the current snapshot.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::types::{IntelligentNotification, NotificationType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    /// Unread notifications.
    pub total: usize,
    pub by_type: BTreeMap<NotificationType, usize>,
    pub by_priority: BTreeMap<i32, usize>,
    /// Unread notifications carrying action data.
    pub action_required: usize,
}

/// Count unread notifications by type and priority.
pub fn summarize_notifications(notifications: &[IntelligentNotification]) -> NotificationSummary {
    let mut summary = NotificationSummary::default();
    for n in notifications.iter().filter(|n| !n.read_status) {
        summary.total += 1;
        *summary.by_type.entry(n.notification_type).or_default() += 1;
        *summary.by_priority.entry(n.priority_level).or_default() += 1;
        if has_action(&n.action_data) {
            summary.action_required += 1;
        }
    }
    summary
}

fn has_action(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(_) => true,
    }
}
