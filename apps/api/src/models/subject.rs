use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::matching::{ProximityImportance, TopicImportance};

/// Sentinel agenda positions for subjects discussed outside the numbered agenda.
/// At most one subject per meeting may live in each bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgendaBucket {
    BeforeAgenda,
    OutOfAgenda,
}

impl AgendaBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgendaBucket::BeforeAgenda => "BEFORE_AGENDA",
            AgendaBucket::OutOfAgenda => "OUT_OF_AGENDA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BEFORE_AGENDA" => Some(AgendaBucket::BeforeAgenda),
            "OUT_OF_AGENDA" => Some(AgendaBucket::OutOfAgenda),
            _ => None,
        }
    }
}

/// Position of a subject in the meeting: a numbered agenda item or one of the
/// two buckets. This is also the reconciliation key within a meeting.
///
/// On the wire it is either a JSON number or `"BEFORE_AGENDA"` / `"OUT_OF_AGENDA"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgendaItemIndex {
    Numbered(i32),
    Bucket(AgendaBucket),
}

impl AgendaItemIndex {
    /// Rebuilds the key from the `agenda_item_index` / `non_agenda_reason` column pair.
    pub fn from_columns(index: Option<i32>, non_agenda_reason: Option<&str>) -> Option<Self> {
        match (index, non_agenda_reason) {
            (Some(n), _) => Some(AgendaItemIndex::Numbered(n)),
            (None, Some(reason)) => AgendaBucket::parse(reason).map(AgendaItemIndex::Bucket),
            (None, None) => None,
        }
    }

    pub fn agenda_item_index(&self) -> Option<i32> {
        match self {
            AgendaItemIndex::Numbered(n) => Some(*n),
            AgendaItemIndex::Bucket(_) => None,
        }
    }

    pub fn non_agenda_reason(&self) -> Option<&'static str> {
        match self {
            AgendaItemIndex::Numbered(_) => None,
            AgendaItemIndex::Bucket(bucket) => Some(bucket.as_str()),
        }
    }
}

impl fmt::Display for AgendaItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgendaItemIndex::Numbered(n) => write!(f, "{n}"),
            AgendaItemIndex::Bucket(bucket) => f.write_str(bucket.as_str()),
        }
    }
}

/// Key columns of a persisted subject, as needed for reconciliation.
#[derive(Debug, Clone, FromRow)]
pub struct SubjectKeyRow {
    pub id: Uuid,
    pub agenda_item_index: Option<i32>,
    pub non_agenda_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerContributionInput {
    pub speaker_id: Option<Uuid>,
    pub text: String,
}

/// One subject as produced by an extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSubject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agenda_item_index: AgendaItemIndex,
    #[serde(default)]
    pub topic_label: Option<String>,
    #[serde(default)]
    pub introduced_by_person_id: Option<Uuid>,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub speaker_contributions: Vec<SpeakerContributionInput>,
    #[serde(default)]
    pub topic_importance: Option<TopicImportance>,
    #[serde(default)]
    pub proximity_importance: Option<ProximityImportance>,
}

/// A subject loaded for matching, with its location's point unpacked.
#[derive(Debug, Clone, FromRow)]
pub struct SubjectMatchRow {
    pub id: Uuid,
    pub name: String,
    pub topic_id: Option<Uuid>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}
