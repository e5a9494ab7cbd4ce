//! Subject reconciler: merges one extraction pass into a meeting's subjects.
//!
//! Flow: load meeting → load existing keys + lookup tables → plan (pure) →
//!       apply plan in one transaction, one savepoint per subject.
//!
//! Subjects are keyed by their agenda position within the meeting. A key that
//! already exists is updated in place (same id, contributions replaced); a new
//! key is inserted. Existing subjects missing from the batch are never touched.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use sqlx::{Acquire, PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::require_meeting;
use crate::errors::AppError;
use crate::matching::ImportanceOverride;
use crate::models::subject::{AgendaItemIndex, ExtractedSubject, SubjectKeyRow};

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Lookup tables used to resolve references carried by extracted subjects.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Topic ids keyed by trimmed, lowercased name.
    pub topics_by_name: HashMap<String, Uuid>,
    /// People of the meeting's city.
    pub person_ids: HashSet<Uuid>,
    /// Locations referenced by the batch that actually exist.
    pub location_ids: HashSet<Uuid>,
}

impl ResolutionContext {
    pub fn with_topics<'a>(topics: impl IntoIterator<Item = (Uuid, &'a str)>) -> Self {
        Self {
            topics_by_name: topics
                .into_iter()
                .map(|(id, name)| (normalize_label(name), id))
                .collect(),
            ..Default::default()
        }
    }

    fn resolve_topic(&self, label: Option<&str>) -> Option<Uuid> {
        let label = label?;
        let resolved = self.topics_by_name.get(&normalize_label(label)).copied();
        if resolved.is_none() {
            warn!("Topic label '{label}' does not match any topic; leaving topic unset");
        }
        resolved
    }

    fn resolve_person(&self, person_id: Option<Uuid>) -> Option<Uuid> {
        let person_id = person_id?;
        if self.person_ids.contains(&person_id) {
            Some(person_id)
        } else {
            warn!("Person {person_id} not found in city; leaving introducer unset");
            None
        }
    }

    fn resolve_location(&self, location_id: Option<Uuid>) -> Option<Uuid> {
        let location_id = location_id?;
        if self.location_ids.contains(&location_id) {
            Some(location_id)
        } else {
            warn!("Location {location_id} not found; leaving location unset");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Insert,
    Update,
}

/// One subject write decided by the planner, with references already resolved.
#[derive(Debug, Clone)]
pub struct PlannedSubject {
    pub id: Uuid,
    pub kind: WriteKind,
    pub key: AgendaItemIndex,
    pub topic_id: Option<Uuid>,
    pub person_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub source: ExtractedSubject,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSubject {
    pub key: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    /// Persisted subject id per agenda key (`"3"`, `"BEFORE_AGENDA"`, …).
    pub ids_by_key: BTreeMap<String, Uuid>,
    /// Importance settings of the batch, keyed by persisted id.
    pub overrides: Vec<ImportanceOverride>,
    pub failed: Vec<FailedSubject>,
}

// ────────────────────────────────────────────────────────────────────────────
// Planning (pure)
// ────────────────────────────────────────────────────────────────────────────

/// Decides insert vs. update for every incoming subject.
///
/// - A key already persisted keeps its id and becomes an `Update`.
/// - A new key gets a fresh id and becomes an `Insert`.
/// - A key repeated inside the batch collapses to one write; the later record wins.
///
/// Existing subjects whose key is absent from the batch produce no write at all.
pub fn plan_reconciliation(
    existing: &[SubjectKeyRow],
    incoming: Vec<ExtractedSubject>,
    ctx: &ResolutionContext,
) -> Vec<PlannedSubject> {
    let existing_ids: HashMap<AgendaItemIndex, Uuid> = existing
        .iter()
        .filter_map(|row| {
            let key = AgendaItemIndex::from_columns(
                row.agenda_item_index,
                row.non_agenda_reason.as_deref(),
            );
            if key.is_none() {
                warn!("Subject {} has no agenda position; ignoring for reconciliation", row.id);
            }
            key.map(|k| (k, row.id))
        })
        .collect();

    let mut plan: Vec<PlannedSubject> = Vec::with_capacity(incoming.len());
    let mut position_by_key: HashMap<AgendaItemIndex, usize> = HashMap::new();

    for subject in incoming {
        let key = subject.agenda_item_index;
        let (id, kind) = match existing_ids.get(&key) {
            Some(id) => (*id, WriteKind::Update),
            None => (Uuid::new_v4(), WriteKind::Insert),
        };

        let planned = PlannedSubject {
            id,
            kind,
            key,
            topic_id: ctx.resolve_topic(subject.topic_label.as_deref()),
            person_id: ctx.resolve_person(subject.introduced_by_person_id),
            location_id: ctx.resolve_location(subject.location_id),
            source: subject,
        };

        match position_by_key.get(&key) {
            Some(&pos) => {
                warn!("Agenda position {key} appears more than once in batch; keeping the last one");
                let (id, kind) = (plan[pos].id, plan[pos].kind);
                plan[pos] = PlannedSubject { id, kind, ..planned };
            }
            None => {
                position_by_key.insert(key, plan.len());
                plan.push(planned);
            }
        }
    }

    plan
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence
// ────────────────────────────────────────────────────────────────────────────

/// Reconciles an extraction pass for one meeting.
///
/// The whole batch runs in one transaction. Each subject gets its own savepoint,
/// so a failing subject is rolled back and reported without aborting the rest.
pub async fn reconcile_subjects(
    pool: &PgPool,
    city_id: &str,
    meeting_id: &str,
    incoming: Vec<ExtractedSubject>,
) -> Result<ReconcileOutcome, AppError> {
    require_meeting(pool, city_id, meeting_id).await?;

    let existing = sqlx::query_as::<_, SubjectKeyRow>(
        r#"
        SELECT id, agenda_item_index, non_agenda_reason
        FROM subjects
        WHERE meeting_id = $1 AND city_id = $2
        "#,
    )
    .bind(meeting_id)
    .bind(city_id)
    .fetch_all(pool)
    .await?;

    let ctx = load_resolution_context(pool, city_id, &incoming).await?;
    let plan = plan_reconciliation(&existing, incoming, &ctx);

    let mut outcome = ReconcileOutcome::default();
    let mut tx = pool.begin().await?;

    for planned in plan {
        let mut savepoint = tx.begin().await?;
        match write_subject(&mut savepoint, city_id, meeting_id, &planned).await {
            Ok(id) => {
                savepoint.commit().await?;
                outcome.ids_by_key.insert(planned.key.to_string(), id);
                outcome.overrides.push(ImportanceOverride {
                    subject_id: id,
                    topic_importance: planned.source.topic_importance,
                    proximity_importance: planned.source.proximity_importance,
                });
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!(
                    "Skipping subject '{}' at position {} of meeting {meeting_id}: {e}",
                    planned.source.name, planned.key
                );
                outcome.failed.push(FailedSubject {
                    key: planned.key.to_string(),
                    name: planned.source.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tx.commit().await?;

    info!(
        "Reconciled meeting {city_id}/{meeting_id}: {} subjects written, {} failed",
        outcome.ids_by_key.len(),
        outcome.failed.len()
    );
    Ok(outcome)
}

async fn load_resolution_context(
    pool: &PgPool,
    city_id: &str,
    incoming: &[ExtractedSubject],
) -> Result<ResolutionContext, sqlx::Error> {
    let topics: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM topics")
        .fetch_all(pool)
        .await?;
    let mut ctx = ResolutionContext::with_topics(topics.iter().map(|(id, name)| (*id, name.as_str())));

    ctx.person_ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM persons WHERE city_id = $1")
        .bind(city_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let referenced: Vec<Uuid> = incoming.iter().filter_map(|s| s.location_id).collect();
    if !referenced.is_empty() {
        ctx.location_ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM locations WHERE id = ANY($1)")
            .bind(&referenced)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    }

    Ok(ctx)
}

/// Writes one planned subject and replaces its speaker contributions.
/// Returns the persisted id, which differs from the planned one only when a
/// concurrent pass inserted the same key first.
async fn write_subject(
    conn: &mut PgConnection,
    city_id: &str,
    meeting_id: &str,
    planned: &PlannedSubject,
) -> Result<Uuid, sqlx::Error> {
    let src = &planned.source;

    let updated = match planned.kind {
        WriteKind::Update => {
            sqlx::query(
                r#"
                UPDATE subjects
                SET name = $2, description = $3, topic_id = $4, location_id = $5,
                    person_id = $6, context = $7, updated_at = now()
                WHERE id = $1 AND meeting_id = $8 AND city_id = $9
                "#,
            )
            .bind(planned.id)
            .bind(&src.name)
            .bind(&src.description)
            .bind(planned.topic_id)
            .bind(planned.location_id)
            .bind(planned.person_id)
            .bind(&src.context)
            .bind(meeting_id)
            .bind(city_id)
            .execute(&mut *conn)
            .await?
            .rows_affected()
                > 0
        }
        WriteKind::Insert => false,
    };

    let id = if updated {
        planned.id
    } else {
        upsert_subject(&mut *conn, city_id, meeting_id, planned).await?
    };

    sqlx::query("DELETE FROM speaker_contributions WHERE subject_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for (position, contribution) in src.speaker_contributions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO speaker_contributions (id, subject_id, speaker_id, text, position)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(contribution.speaker_id)
        .bind(&contribution.text)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

/// Inserts with the planned id, or takes over the row that already holds this
/// agenda position (numbered index or bucket) if one exists.
async fn upsert_subject(
    conn: &mut PgConnection,
    city_id: &str,
    meeting_id: &str,
    planned: &PlannedSubject,
) -> Result<Uuid, sqlx::Error> {
    let conflict_target = match planned.key {
        AgendaItemIndex::Numbered(_) => {
            "(city_id, meeting_id, agenda_item_index) WHERE agenda_item_index IS NOT NULL"
        }
        AgendaItemIndex::Bucket(_) => {
            "(city_id, meeting_id, non_agenda_reason) WHERE non_agenda_reason IS NOT NULL"
        }
    };
    let sql = format!(
        r#"
        INSERT INTO subjects
            (id, name, description, agenda_item_index, non_agenda_reason,
             topic_id, location_id, person_id, context, meeting_id, city_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT {conflict_target}
        DO UPDATE SET
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            topic_id = EXCLUDED.topic_id,
            location_id = EXCLUDED.location_id,
            person_id = EXCLUDED.person_id,
            context = EXCLUDED.context,
            updated_at = now()
        RETURNING id
        "#
    );

    let src = &planned.source;
    sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(planned.id)
        .bind(&src.name)
        .bind(&src.description)
        .bind(planned.key.agenda_item_index())
        .bind(planned.key.non_agenda_reason())
        .bind(planned.topic_id)
        .bind(planned.location_id)
        .bind(planned.person_id)
        .bind(&src.context)
        .bind(meeting_id)
        .bind(city_id)
        .fetch_one(&mut *conn)
        .await
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{ProximityImportance, TopicImportance};
    use crate::models::subject::{AgendaBucket, SpeakerContributionInput};

    fn extracted(name: &str, key: AgendaItemIndex) -> ExtractedSubject {
        ExtractedSubject {
            name: name.to_string(),
            description: format!("{name} description"),
            agenda_item_index: key,
            topic_label: None,
            introduced_by_person_id: None,
            location_id: None,
            context: None,
            speaker_contributions: vec![],
            topic_importance: None,
            proximity_importance: None,
        }
    }

    /// Applies a plan to an in-memory key table the way the database would.
    fn apply(existing: &mut Vec<SubjectKeyRow>, plan: &[PlannedSubject]) {
        for p in plan {
            if p.kind == WriteKind::Insert {
                existing.push(SubjectKeyRow {
                    id: p.id,
                    agenda_item_index: p.key.agenda_item_index(),
                    non_agenda_reason: p.key.non_agenda_reason().map(String::from),
                });
            }
        }
    }

    fn ids(plan: &[PlannedSubject]) -> Vec<(AgendaItemIndex, Uuid)> {
        let mut ids: Vec<_> = plan.iter().map(|p| (p.key, p.id)).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_first_pass_inserts_everything() {
        let batch = vec![
            extracted("Budget amendment", AgendaItemIndex::Numbered(1)),
            extracted("Opening remarks", AgendaItemIndex::Bucket(AgendaBucket::BeforeAgenda)),
        ];
        let plan = plan_reconciliation(&[], batch, &ResolutionContext::default());
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|p| p.kind == WriteKind::Insert));
    }

    #[test]
    fn test_same_batch_twice_keeps_ids() {
        let batch = vec![
            extracted("Budget amendment", AgendaItemIndex::Numbered(1)),
            extracted("Park lighting", AgendaItemIndex::Numbered(2)),
            extracted("Citizen question", AgendaItemIndex::Bucket(AgendaBucket::OutOfAgenda)),
        ];
        let ctx = ResolutionContext::default();
        let mut table = Vec::new();

        let first = plan_reconciliation(&table, batch.clone(), &ctx);
        apply(&mut table, &first);
        let second = plan_reconciliation(&table, batch, &ctx);
        apply(&mut table, &second);

        assert!(second.iter().all(|p| p.kind == WriteKind::Update));
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_matched_subject_keeps_id_and_unmatched_is_untouched() {
        let kept_id = Uuid::new_v4();
        let highlighted_id = Uuid::new_v4();
        let existing = vec![
            SubjectKeyRow {
                id: kept_id,
                agenda_item_index: Some(4),
                non_agenda_reason: None,
            },
            SubjectKeyRow {
                id: highlighted_id,
                agenda_item_index: Some(9),
                non_agenda_reason: None,
            },
        ];

        let plan = plan_reconciliation(
            &existing,
            vec![extracted("Renamed item four", AgendaItemIndex::Numbered(4))],
            &ResolutionContext::default(),
        );

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, kept_id);
        assert_eq!(plan[0].kind, WriteKind::Update);
        assert!(plan.iter().all(|p| p.id != highlighted_id));
    }

    #[test]
    fn test_bucket_is_replaced_not_appended() {
        let ctx = ResolutionContext::default();
        let mut table = Vec::new();
        let key = AgendaItemIndex::Bucket(AgendaBucket::BeforeAgenda);

        let first = plan_reconciliation(&table, vec![extracted("Mayor's statement", key)], &ctx);
        apply(&mut table, &first);
        let second = plan_reconciliation(&table, vec![extracted("Minute of silence", key)], &ctx);
        apply(&mut table, &second);

        let bucket_rows: Vec<_> = table
            .iter()
            .filter(|r| r.non_agenda_reason.as_deref() == Some("BEFORE_AGENDA"))
            .collect();
        assert_eq!(bucket_rows.len(), 1);
        assert_eq!(second[0].kind, WriteKind::Update);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].source.name, "Minute of silence");
    }

    #[test]
    fn test_buckets_are_independent_of_numbered_items() {
        let existing = vec![SubjectKeyRow {
            id: Uuid::new_v4(),
            agenda_item_index: None,
            non_agenda_reason: Some("OUT_OF_AGENDA".to_string()),
        }];
        let plan = plan_reconciliation(
            &existing,
            vec![extracted("Opening", AgendaItemIndex::Bucket(AgendaBucket::BeforeAgenda))],
            &ResolutionContext::default(),
        );
        assert_eq!(plan[0].kind, WriteKind::Insert);
    }

    #[test]
    fn test_duplicate_key_in_batch_collapses_to_last() {
        let plan = plan_reconciliation(
            &[],
            vec![
                extracted("First draft", AgendaItemIndex::Numbered(5)),
                extracted("Second draft", AgendaItemIndex::Numbered(5)),
            ],
            &ResolutionContext::default(),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].source.name, "Second draft");
    }

    #[test]
    fn test_topic_label_resolution() {
        let environment = Uuid::new_v4();
        let ctx = ResolutionContext::with_topics([(environment, "Environment")]);

        let mut known = extracted("Tree planting", AgendaItemIndex::Numbered(1));
        known.topic_label = Some("  environment ".to_string());
        let mut unknown = extracted("Parking fees", AgendaItemIndex::Numbered(2));
        unknown.topic_label = Some("Transport".to_string());

        let plan = plan_reconciliation(&[], vec![known, unknown], &ctx);
        assert_eq!(plan[0].topic_id, Some(environment));
        assert_eq!(plan[1].topic_id, None);
    }

    #[test]
    fn test_dangling_person_and_location_are_nulled() {
        let councillor = Uuid::new_v4();
        let square = Uuid::new_v4();
        let ctx = ResolutionContext {
            person_ids: HashSet::from([councillor]),
            location_ids: HashSet::from([square]),
            ..Default::default()
        };

        let mut good = extracted("Square renovation", AgendaItemIndex::Numbered(1));
        good.introduced_by_person_id = Some(councillor);
        good.location_id = Some(square);
        let mut bad = extracted("Harbour works", AgendaItemIndex::Numbered(2));
        bad.introduced_by_person_id = Some(Uuid::new_v4());
        bad.location_id = Some(Uuid::new_v4());

        let plan = plan_reconciliation(&[], vec![good, bad], &ctx);
        assert_eq!(plan[0].person_id, Some(councillor));
        assert_eq!(plan[0].location_id, Some(square));
        assert_eq!(plan[1].person_id, None);
        assert_eq!(plan[1].location_id, None);
    }

    #[test]
    fn test_plan_carries_contributions_and_importance() {
        let mut subject = extracted("Bus routes", AgendaItemIndex::Numbered(3));
        subject.speaker_contributions = vec![SpeakerContributionInput {
            speaker_id: None,
            text: "We need a line to the hospital.".to_string(),
        }];
        subject.topic_importance = Some(TopicImportance::High);
        subject.proximity_importance = Some(ProximityImportance::Wide);

        let plan = plan_reconciliation(&[], vec![subject], &ResolutionContext::default());
        assert_eq!(plan[0].source.speaker_contributions.len(), 1);
        assert_eq!(plan[0].source.topic_importance, Some(TopicImportance::High));
    }
}
