/// Inbound push frame shapes and classification
///
/// Both channels deliver JSON objects carrying a `type` discriminator plus
/// optional `payload`, `message`, `reason`, `resourceId` and `count` fields.
/// Administrative frames may also nest the real action under
/// `{"type": "ADMIN_ACTION", "action": "..."}`.
use crate::models::{normalize_discriminator, NormalizeError, Notification, NotificationType};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(rename = "type", alias = "event")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub payload: Option<Value>,
    pub message: Option<String>,
    pub reason: Option<String>,
    #[serde(alias = "resource_id")]
    pub resource_id: Option<Value>,
    #[serde(alias = "resource_type")]
    pub resource_type: Option<String>,
    pub count: Option<Value>,
}

/// A frame after classification and normalization
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedFrame {
    SessionTerminated {
        reason: String,
    },
    ResourceRemoved {
        resource_type: String,
        resource_id: String,
        message: String,
    },
    UserNotification(Notification),
    UnreadCount(u64),
}

impl ClassifiedFrame {
    /// Label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedFrame::SessionTerminated { .. } => "session_terminated",
            ClassifiedFrame::ResourceRemoved { .. } => "resource_removed",
            ClassifiedFrame::UserNotification(_) => "user_notification",
            ClassifiedFrame::UnreadCount(_) => "unread_count",
        }
    }
}

/// Why a frame was dropped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame has no type discriminator")]
    MissingType,

    #[error("unrecognized frame type {0:?}")]
    UnknownType(String),

    #[error("malformed {kind} frame: {detail}")]
    Malformed { kind: &'static str, detail: String },
}

impl FrameError {
    pub fn reason(&self) -> &'static str {
        match self {
            FrameError::InvalidJson(_) => "invalid_json",
            FrameError::MissingType => "missing_type",
            FrameError::UnknownType(_) => "unknown_type",
            FrameError::Malformed { .. } => "malformed",
        }
    }

    fn malformed(kind: &'static str, detail: impl Into<String>) -> Self {
        FrameError::Malformed {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<NormalizeError> for FrameError {
    fn from(e: NormalizeError) -> Self {
        FrameError::malformed("user_notification", e.to_string())
    }
}

enum Discriminator {
    SessionTerminated,
    ResourceRemoved,
    UserNotification,
    UnreadCount,
}

fn discriminate(normalized: &str) -> Option<Discriminator> {
    match normalized {
        "SESSION_TERMINATED" | "FORCE_LOGOUT" | "ACCOUNT_SUSPENDED" | "ACCOUNT_BANNED"
        | "USER_BANNED" | "USER_SUSPENDED" => Some(Discriminator::SessionTerminated),
        "RESOURCE_REMOVED" | "JOB_DEACTIVATED" | "JOB_REMOVED" | "JOB_DELETED"
        | "ACCOUNT_DEACTIVATED" | "COMPANY_DEACTIVATED" => Some(Discriminator::ResourceRemoved),
        "NOTIFICATION" | "NEW_NOTIFICATION" | "USER_NOTIFICATION" => {
            Some(Discriminator::UserNotification)
        }
        "UNREAD_COUNT" | "UNREAD_COUNT_SYNC" | "UNREAD_COUNT_UPDATE" | "COUNT_SYNC" => {
            Some(Discriminator::UnreadCount)
        }
        // Bare notification types delivered with their fields at the top level
        other if NotificationType::parse(other) != NotificationType::Other => {
            Some(Discriminator::UserNotification)
        }
        _ => None,
    }
}

/// Parse and classify one raw text frame
pub fn classify(raw: &str) -> Result<ClassifiedFrame, FrameError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    classify_value(&value)
}

pub fn classify_value(value: &Value) -> Result<ClassifiedFrame, FrameError> {
    if !value.is_object() {
        return Err(FrameError::InvalidJson("top level is not an object".into()));
    }
    let frame: InboundFrame = serde_json::from_value(value.clone())
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    let raw_kind = frame
        .kind
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or(FrameError::MissingType)?;
    let mut normalized = normalize_discriminator(raw_kind);

    if normalized == "ADMIN_ACTION" {
        let action = frame
            .action
            .clone()
            .or_else(|| payload_str(&frame, &["action"]))
            .ok_or_else(|| FrameError::malformed("admin_action", "no action"))?;
        normalized = normalize_discriminator(&action);
    }

    match discriminate(&normalized) {
        Some(Discriminator::SessionTerminated) => Ok(ClassifiedFrame::SessionTerminated {
            reason: frame
                .reason
                .clone()
                .or_else(|| frame.message.clone())
                .or_else(|| payload_str(&frame, &["reason", "message"]))
                .unwrap_or_else(|| "Your session was ended by an administrator".to_string()),
        }),
        Some(Discriminator::ResourceRemoved) => resource_removed(&frame, &normalized),
        Some(Discriminator::UserNotification) => {
            let source = match &frame.payload {
                Some(payload) if payload.is_object() => payload,
                _ => value,
            };
            Ok(ClassifiedFrame::UserNotification(
                Notification::from_loose_json(source)?,
            ))
        }
        Some(Discriminator::UnreadCount) => unread_count(&frame).map(ClassifiedFrame::UnreadCount),
        None => Err(FrameError::UnknownType(raw_kind.to_string())),
    }
}

fn resource_removed(frame: &InboundFrame, normalized: &str) -> Result<ClassifiedFrame, FrameError> {
    let resource_type = frame
        .resource_type
        .clone()
        .or_else(|| payload_str(frame, &["resourceType", "resource_type"]))
        .unwrap_or_else(|| {
            match normalized.split('_').next() {
                Some("JOB") => "job",
                Some("ACCOUNT") => "account",
                Some("COMPANY") => "company",
                _ => "resource",
            }
            .to_string()
        });

    let resource_id = frame
        .resource_id
        .as_ref()
        .and_then(scalar_to_string)
        .or_else(|| payload_str(frame, &["resourceId", "resource_id", "id"]))
        .ok_or_else(|| FrameError::malformed("resource_removed", "no resource id"))?;

    let message = frame
        .message
        .clone()
        .or_else(|| payload_str(frame, &["message", "reason"]))
        .unwrap_or_else(|| format!("This {resource_type} is no longer available"));

    Ok(ClassifiedFrame::ResourceRemoved {
        resource_type,
        resource_id,
        message,
    })
}

fn unread_count(frame: &InboundFrame) -> Result<u64, FrameError> {
    let candidate = frame.count.as_ref().or_else(|| match &frame.payload {
        Some(Value::Number(_)) => frame.payload.as_ref(),
        Some(payload @ Value::Object(_)) => ["count", "unreadCount", "unread_count"]
            .iter()
            .find_map(|key| payload.get(*key)),
        _ => None,
    });

    let value = candidate.ok_or_else(|| FrameError::malformed("unread_count", "no count"))?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| FrameError::malformed("unread_count", format!("invalid count {value}")))
}

fn payload_str(frame: &InboundFrame, keys: &[&str]) -> Option<String> {
    let payload = frame.payload.as_ref()?;
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .find_map(scalar_to_string)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
