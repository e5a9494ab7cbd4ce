use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopicImportance {
    DoNotNotify,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProximityImportance {
    #[default]
    None,
    Near,
    Wide,
}

/// Per-subject importance settings fed to the match engine.
/// Unset fields fall back to the defaults in [`ImportanceOverride::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportanceOverride {
    pub subject_id: Uuid,
    #[serde(default)]
    pub topic_importance: Option<TopicImportance>,
    #[serde(default)]
    pub proximity_importance: Option<ProximityImportance>,
}

impl ImportanceOverride {
    /// Effective settings for a subject. Without an explicit topic importance,
    /// subjects with a topic are `Normal` and subjects without one `DoNotNotify`.
    pub fn resolve(
        over: Option<&ImportanceOverride>,
        has_topic: bool,
    ) -> (TopicImportance, ProximityImportance) {
        let default_topic = if has_topic {
            TopicImportance::Normal
        } else {
            TopicImportance::DoNotNotify
        };
        let topic = over
            .and_then(|o| o.topic_importance)
            .unwrap_or(default_topic);
        let proximity = over
            .and_then(|o| o.proximity_importance)
            .unwrap_or_default();
        (topic, proximity)
    }
}

/// Later entries for the same subject replace earlier ones.
pub fn index_overrides(overrides: &[ImportanceOverride]) -> HashMap<Uuid, ImportanceOverride> {
    overrides.iter().map(|o| (o.subject_id, *o)).collect()
}

/// Distance cutoffs for proximity matching, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityRadii {
    pub near_meters: f64,
    pub wide_meters: f64,
}

impl ProximityRadii {
    pub const DEFAULT: ProximityRadii = ProximityRadii {
        near_meters: 500.0,
        wide_meters: 1000.0,
    };

    pub fn radius_for(&self, importance: ProximityImportance) -> Option<f64> {
        match importance {
            ProximityImportance::None => None,
            ProximityImportance::Near => Some(self.near_meters),
            ProximityImportance::Wide => Some(self.wide_meters),
        }
    }
}

impl Default for ProximityRadii {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_depend_on_topic_presence() {
        assert_eq!(
            ImportanceOverride::resolve(None, true),
            (TopicImportance::Normal, ProximityImportance::None)
        );
        assert_eq!(
            ImportanceOverride::resolve(None, false),
            (TopicImportance::DoNotNotify, ProximityImportance::None)
        );
    }

    #[test]
    fn test_partial_override_keeps_other_default() {
        let over = ImportanceOverride {
            subject_id: Uuid::new_v4(),
            topic_importance: None,
            proximity_importance: Some(ProximityImportance::Wide),
        };
        assert_eq!(
            ImportanceOverride::resolve(Some(&over), true),
            (TopicImportance::Normal, ProximityImportance::Wide)
        );
    }

    #[test]
    fn test_override_wire_format() {
        let id = Uuid::new_v4();
        let json = serde_json::json!({
            "subject_id": id,
            "topic_importance": "doNotNotify",
            "proximity_importance": "near"
        });
        let over: ImportanceOverride = serde_json::from_value(json).unwrap();
        assert_eq!(over.topic_importance, Some(TopicImportance::DoNotNotify));
        assert_eq!(over.proximity_importance, Some(ProximityImportance::Near));
    }

    #[test]
    fn test_radius_for_none_is_none() {
        assert_eq!(ProximityRadii::DEFAULT.radius_for(ProximityImportance::None), None);
        assert_eq!(
            ProximityRadii::DEFAULT.radius_for(ProximityImportance::Wide),
            Some(1000.0)
        );
    }
}
