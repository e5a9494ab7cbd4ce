use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::matching::geo::GeoPoint;
use crate::matching::importance::{ImportanceOverride, ProximityRadii, TopicImportance};
use crate::models::notification::MatchReason;

/// The slice of a subject the engine looks at.
#[derive(Debug, Clone)]
pub struct SubjectForMatching {
    pub id: Uuid,
    pub topic_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
}

/// A user's notification preference for the city being matched.
#[derive(Debug, Clone, Default)]
pub struct MatchCandidate {
    pub user_id: Uuid,
    pub interests: HashSet<Uuid>,
    pub locations: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubjectMatch {
    pub subject_id: Uuid,
    pub reason: MatchReason,
}

/// Matches per user. Users without any match are absent.
pub type UserMatches = HashMap<Uuid, BTreeSet<SubjectMatch>>;

/// Computes every (user, subject, reason) match for one batch of subjects.
///
/// Topic and proximity rules are evaluated independently, so one user can
/// collect both a `Topic` and a `Proximity` entry for the same subject.
pub fn match_subjects(
    subjects: &[SubjectForMatching],
    candidates: &[MatchCandidate],
    overrides: &HashMap<Uuid, ImportanceOverride>,
    radii: &ProximityRadii,
) -> UserMatches {
    let mut matches: UserMatches = HashMap::new();

    for subject in subjects {
        let (topic_importance, proximity_importance) =
            ImportanceOverride::resolve(overrides.get(&subject.id), subject.topic_id.is_some());
        let proximity = subject
            .location
            .zip(radii.radius_for(proximity_importance));

        for candidate in candidates {
            let topic_hit = topic_reason(topic_importance, subject.topic_id, candidate);
            let proximity_hit = proximity.and_then(|(origin, radius)| {
                within_radius(&origin, radius, &candidate.locations).then_some(MatchReason::Proximity)
            });

            for reason in [topic_hit, proximity_hit].into_iter().flatten() {
                matches
                    .entry(candidate.user_id)
                    .or_default()
                    .insert(SubjectMatch {
                        subject_id: subject.id,
                        reason,
                    });
            }
        }
    }

    matches
}

fn topic_reason(
    importance: TopicImportance,
    topic_id: Option<Uuid>,
    candidate: &MatchCandidate,
) -> Option<MatchReason> {
    match importance {
        TopicImportance::High => Some(MatchReason::GeneralInterest),
        TopicImportance::Normal => topic_id
            .filter(|t| candidate.interests.contains(t))
            .map(|_| MatchReason::Topic),
        TopicImportance::DoNotNotify => None,
    }
}

fn within_radius(origin: &GeoPoint, radius_meters: f64, areas: &[GeoPoint]) -> bool {
    areas
        .iter()
        .any(|area| origin.distance_meters(area) <= radius_meters)
}
