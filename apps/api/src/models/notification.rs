use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Meeting phase a notification belongs to. Stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    BeforeMeeting,
    AfterMeeting,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BeforeMeeting => "beforeMeeting",
            NotificationType::AfterMeeting => "afterMeeting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beforeMeeting" => Some(NotificationType::BeforeMeeting),
            "afterMeeting" => Some(NotificationType::AfterMeeting),
            _ => None,
        }
    }
}

/// Why a subject was included in a user's notification.
/// Several reasons may apply to the same subject at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchReason {
    Topic,
    Proximity,
    GeneralInterest,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Topic => "topic",
            MatchReason::Proximity => "proximity",
            MatchReason::GeneralInterest => "generalInterest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMedium {
    Email,
    Message,
}

impl DeliveryMedium {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMedium::Email => "email",
            DeliveryMedium::Message => "message",
        }
    }
}

/// Delivery lifecycle. Only `Pending` is ever written here; the transport
/// flips rows to `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationDeliveryRow {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub medium: String,
    pub status: String,
    pub address: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_wire_names() {
        let json = serde_json::to_string(&NotificationType::BeforeMeeting).unwrap();
        assert_eq!(json, "\"beforeMeeting\"");
        assert_eq!(
            NotificationType::parse("afterMeeting"),
            Some(NotificationType::AfterMeeting)
        );
        assert_eq!(NotificationType::parse("duringMeeting"), None);
    }

    #[test]
    fn test_match_reason_db_names_match_serde() {
        for reason in [
            MatchReason::Topic,
            MatchReason::Proximity,
            MatchReason::GeneralInterest,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }
}
