use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Notification type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A new job posting matched the applicant's profile
    JobMatch,
    /// An application changed status
    ApplicationUpdate,
    /// Platform-wide message
    SystemMessage,
    /// Moderation action taken by an administrator
    AdminAction,
    /// Subscription renewed, expired or changed plan
    SubscriptionUpdate,
    /// Someone viewed the applicant's profile
    ProfileView,
    /// Anything the client does not know yet
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::JobMatch => "JOB_MATCH",
            NotificationType::ApplicationUpdate => "APPLICATION_UPDATE",
            NotificationType::SystemMessage => "SYSTEM_MESSAGE",
            NotificationType::AdminAction => "ADMIN_ACTION",
            NotificationType::SubscriptionUpdate => "SUBSCRIPTION_UPDATE",
            NotificationType::ProfileView => "PROFILE_VIEW",
            NotificationType::Other => "OTHER",
        }
    }

    /// Lenient parse accepting `job_match`, `job-match`, `JobMatch` and friends
    pub fn parse(raw: &str) -> Self {
        match normalize_discriminator(raw).as_str() {
            "JOB_MATCH" | "NEW_JOB_MATCH" => NotificationType::JobMatch,
            "APPLICATION_UPDATE" | "APPLICATION_STATUS" | "APPLICATION_STATUS_CHANGED" => {
                NotificationType::ApplicationUpdate
            }
            "SYSTEM_MESSAGE" | "SYSTEM" => NotificationType::SystemMessage,
            "ADMIN_ACTION" => NotificationType::AdminAction,
            "SUBSCRIPTION_UPDATE" | "SUBSCRIPTION" => NotificationType::SubscriptionUpdate,
            "PROFILE_VIEW" => NotificationType::ProfileView,
            _ => NotificationType::Other,
        }
    }

    fn default_title(&self) -> &'static str {
        match self {
            NotificationType::JobMatch => "New job match",
            NotificationType::ApplicationUpdate => "Application update",
            NotificationType::SystemMessage => "System message",
            NotificationType::AdminAction => "Account notice",
            NotificationType::SubscriptionUpdate => "Subscription update",
            NotificationType::ProfileView => "Profile viewed",
            NotificationType::Other => "Notification",
        }
    }
}

/// Upper-cases a wire discriminator and folds `-`, `.` and spaces into `_`.
/// CamelCase input is split on case boundaries first.
pub fn normalize_discriminator(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for ch in raw.trim().chars() {
        match ch {
            '-' | '.' | ' ' | '_' => {
                out.push('_');
                prev_lower = false;
            }
            c if c.is_ascii_uppercase() && prev_lower => {
                out.push('_');
                out.push(c);
                prev_lower = false;
            }
            c => {
                out.push(c.to_ascii_uppercase());
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
    }
    out
}

/// Core notification model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Stable across push delivery and fetch
    pub id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub title: String,

    pub content: String,

    pub read: bool,

    pub created_at: DateTime<Utc>,

    /// Opaque key/value pairs such as `jobId` or `applicationId`
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("notification is not a JSON object")]
    NotAnObject,
    #[error("notification has no id")]
    MissingId,
}

impl Notification {
    /// Metadata value rendered as a string; numeric ids are accepted too
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Build a notification from loosely shaped JSON.
    ///
    /// Pushed frames and REST responses disagree on field names, so every
    /// field accepts its known aliases (`content`/`message`/`body`,
    /// `read`/`isRead`/`is_read`, ...). Only a missing id is fatal.
    pub fn from_loose_json(value: &Value) -> Result<Self, NormalizeError> {
        let obj = value.as_object().ok_or(NormalizeError::NotAnObject)?;

        let id = first_of(obj, &["id", "notificationId", "notification_id", "_id"])
            .and_then(value_to_id)
            .ok_or(NormalizeError::MissingId)?;

        let notification_type = first_of(obj, &["notificationType", "notification_type", "type"])
            .and_then(Value::as_str)
            .map(NotificationType::parse)
            .unwrap_or(NotificationType::Other);

        let title = first_of(obj, &["title", "subject"])
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| notification_type.default_title().to_owned());

        let content = first_of(obj, &["content", "message", "body"])
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let read = first_of(obj, &["read", "isRead", "is_read"])
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let created_at = first_of(obj, &["createdAt", "created_at", "timestamp"])
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let metadata = first_of(obj, &["metadata", "data"])
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Notification {
            id,
            notification_type,
            title,
            content,
            read,
            created_at,
            metadata,
        })
    }
}

fn first_of<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339 strings, naive `YYYY-MM-DDTHH:MM:SS` strings (taken as UTC) or epoch millis
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Result of a full notification fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub unread_count: u64,
}

/// Toast severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastType {
    Info,
    Success,
    Warning,
    Error,
}

/// Navigation attached to a toast
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastAction {
    pub label: String,
    pub target: String,
}

/// Transient UI alert. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    /// Assigned by the queue when absent
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub toast_type: ToastType,
    pub title: String,
    pub message: String,
    pub action: Option<ToastAction>,
    /// Auto-dismiss delay in milliseconds, 0 keeps the toast until dismissed
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Toast {
    pub fn new(toast_type: ToastType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            toast_type,
            title: title.into(),
            message: message.into(),
            action: None,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, label: impl Into<String>, target: impl Into<String>) -> Self {
        self.action = Some(ToastAction {
            label: label.into(),
            target: target.into(),
        });
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// The two logical push channels of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Administrative events, opened for every authenticated session
    AdminActions,
    /// Personalized notifications, opened only for entitled sessions
    Notifications,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::AdminActions, ChannelKind::Notifications];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::AdminActions => "admin",
            ChannelKind::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }

    /// A listener task is alive in these states
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// Numeric encoding exported through the connection state gauge
    pub fn gauge_value(&self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Disconnected => 4,
            ConnectionState::Error => 5,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminator_normalization() {
        assert_eq!(normalize_discriminator("job-match"), "JOB_MATCH");
        assert_eq!(normalize_discriminator("jobMatch"), "JOB_MATCH");
        assert_eq!(normalize_discriminator("unread.count"), "UNREAD_COUNT");
        assert_eq!(normalize_discriminator(" SESSION_TERMINATED "), "SESSION_TERMINATED");
    }

    #[test]
    fn test_notification_type_parse_is_lenient() {
        assert_eq!(NotificationType::parse("job_match"), NotificationType::JobMatch);
        assert_eq!(
            NotificationType::parse("ApplicationUpdate"),
            NotificationType::ApplicationUpdate
        );
        assert_eq!(NotificationType::parse("carrier-pigeon"), NotificationType::Other);
    }

    #[test]
    fn test_loose_json_accepts_message_alias() {
        let n = Notification::from_loose_json(&json!({
            "id": 42,
            "type": "JOB_MATCH",
            "message": "Backend engineer at Acme",
            "isRead": true,
            "createdAt": "2026-10-01T12:00:00Z",
            "metadata": { "jobId": 7 }
        }))
        .unwrap();

        assert_eq!(n.id, "42");
        assert_eq!(n.notification_type, NotificationType::JobMatch);
        assert_eq!(n.title, "New job match");
        assert_eq!(n.content, "Backend engineer at Acme");
        assert!(n.read);
        assert_eq!(n.metadata_str("jobId").as_deref(), Some("7"));
    }

    #[test]
    fn test_loose_json_prefers_content_over_message() {
        let n = Notification::from_loose_json(&json!({
            "id": "n-1",
            "content": "primary",
            "message": "secondary",
        }))
        .unwrap();
        assert_eq!(n.content, "primary");
        assert!(!n.read);
    }

    #[test]
    fn test_loose_json_epoch_millis_timestamp() {
        let n = Notification::from_loose_json(&json!({
            "id": "n-1",
            "timestamp": 1_760_000_000_000i64,
        }))
        .unwrap();
        assert_eq!(n.created_at.timestamp_millis(), 1_760_000_000_000);
    }

    #[test]
    fn test_loose_json_without_id_is_rejected() {
        let err = Notification::from_loose_json(&json!({ "title": "no id" })).unwrap_err();
        assert_eq!(err, NormalizeError::MissingId);

        let err = Notification::from_loose_json(&json!("just a string")).unwrap_err();
        assert_eq!(err, NormalizeError::NotAnObject);
    }

    #[test]
    fn test_notification_serializes_camel_case() {
        let n = Notification::from_loose_json(&json!({ "id": "n-1", "type": "SYSTEM_MESSAGE" }))
            .unwrap();
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "SYSTEM_MESSAGE");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_connection_state_activity() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Reconnecting.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Error.is_active());
    }
}
