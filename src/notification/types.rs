use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of platform events delivered over the notification channel.
/// A closed enum so adding a kind is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Welcome event sent right after authentication succeeds
    Connected,
    SubmissionReviewed,
    BadgeUnlocked,
    ChatMessage,
    TaskAssigned,
    PointsUpdated,
    RankChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::SubmissionReviewed => "submissionReviewed",
            EventKind::BadgeUnlocked => "badgeUnlocked",
            EventKind::ChatMessage => "chatMessage",
            EventKind::TaskAssigned => "taskAssigned",
            EventKind::PointsUpdated => "pointsUpdated",
            EventKind::RankChanged => "rankChanged",
        }
    }
}

/// A platform event as it travels to the client. Fire-and-forget; never
/// persisted or queued for offline recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl PlatformEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    pub fn for_user(kind: EventKind, data: serde_json::Value, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            user_id: Some(user_id.into()),
        }
    }
}
