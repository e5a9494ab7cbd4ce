//! Notification builder: turns subject matches into notification rows.
//!
//! Flow: load meeting → load subjects + city preferences → match_subjects →
//!       plan (pure) → upsert per user in one transaction, one savepoint per user.
//!
//! Re-running for the same meeting and type is idempotent: the notification row
//! is reused, existing subject links are kept, and each medium has at most one
//! delivery row whose body is refreshed only while still pending.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use sqlx::{Acquire, PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::require_meeting;
use crate::errors::AppError;
use crate::matching::{
    match_subjects, GeoPoint, ImportanceOverride, MatchCandidate, ProximityRadii,
    SubjectForMatching, SubjectMatch, UserMatches,
};
use crate::models::meeting::MeetingRow;
use crate::models::notification::{DeliveryMedium, DeliveryStatus, MatchReason, NotificationType};
use crate::models::preference::{PreferenceHolderRow, PreferenceLocationRow, PreferenceTopicRow};
use crate::models::subject::SubjectMatchRow;
use crate::notifications::render::{render_email_body, render_message_body, RenderedSubject};

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Contact details of a user with a preference in the city, keyed by user id.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDelivery {
    pub medium: DeliveryMedium,
    pub address: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct PlannedNotification {
    pub user_id: Uuid,
    pub matches: Vec<SubjectMatch>,
    pub deliveries: Vec<PlannedDelivery>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    /// Notifications created or reused.
    pub notifications_created: usize,
    /// Sum of (subject, reason) matches over all written notifications.
    pub subjects_total: usize,
    pub failed_users: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Planning (pure)
// ────────────────────────────────────────────────────────────────────────────

/// Groups preference rows into match candidates and recipients.
pub fn assemble_candidates(
    holders: Vec<PreferenceHolderRow>,
    topics: Vec<PreferenceTopicRow>,
    locations: Vec<PreferenceLocationRow>,
) -> (Vec<MatchCandidate>, HashMap<Uuid, Recipient>) {
    let mut candidates: HashMap<Uuid, MatchCandidate> = HashMap::new();
    let mut recipients = HashMap::new();

    for holder in holders {
        candidates.insert(
            holder.user_id,
            MatchCandidate {
                user_id: holder.user_id,
                ..Default::default()
            },
        );
        recipients.insert(
            holder.user_id,
            Recipient {
                name: holder.name,
                email: holder.email,
                phone: holder.phone,
            },
        );
    }
    for row in topics {
        if let Some(candidate) = candidates.get_mut(&row.user_id) {
            candidate.interests.insert(row.topic_id);
        }
    }
    for row in locations {
        if let Some(candidate) = candidates.get_mut(&row.user_id) {
            candidate.locations.push(GeoPoint::new(row.lat, row.lng));
        }
    }

    let mut candidates: Vec<MatchCandidate> = candidates.into_values().collect();
    candidates.sort_by_key(|c| c.user_id);
    (candidates, recipients)
}

/// Builds one notification per user with at least one match, with an email
/// delivery when the user has an email and a message delivery when they have
/// a phone number.
pub fn plan_notifications(
    matches: &UserMatches,
    recipients: &HashMap<Uuid, Recipient>,
    subject_names: &HashMap<Uuid, String>,
    meeting: &MeetingRow,
    kind: NotificationType,
) -> Vec<PlannedNotification> {
    let mut planned = Vec::new();

    for (user_id, user_matches) in matches {
        if user_matches.is_empty() {
            continue;
        }
        let Some(recipient) = recipients.get(user_id) else {
            warn!("Matched user {user_id} has no recipient record; skipping");
            continue;
        };

        let rendered = rendered_subjects(user_matches, subject_names);
        let mut deliveries = Vec::new();
        if let Some(email) = usable(recipient.email.as_deref()) {
            deliveries.push(PlannedDelivery {
                medium: DeliveryMedium::Email,
                address: email.to_string(),
                body: render_email_body(meeting, kind, recipient.name.as_deref(), &rendered),
            });
        }
        if let Some(phone) = usable(recipient.phone.as_deref()) {
            deliveries.push(PlannedDelivery {
                medium: DeliveryMedium::Message,
                address: phone.to_string(),
                body: render_message_body(meeting, kind, &rendered),
            });
        }

        planned.push(PlannedNotification {
            user_id: *user_id,
            matches: user_matches.iter().copied().collect(),
            deliveries,
        });
    }

    planned.sort_by_key(|p| p.user_id);
    planned
}

fn usable(contact: Option<&str>) -> Option<&str> {
    contact.map(str::trim).filter(|c| !c.is_empty())
}

/// Collapses (subject, reason) pairs into one line per subject, in match order.
fn rendered_subjects<'a>(
    matches: &BTreeSet<SubjectMatch>,
    subject_names: &'a HashMap<Uuid, String>,
) -> Vec<RenderedSubject<'a>> {
    let mut by_subject: Vec<(Uuid, Vec<MatchReason>)> = Vec::new();
    for m in matches {
        match by_subject.last_mut() {
            Some((id, reasons)) if *id == m.subject_id => reasons.push(m.reason),
            _ => by_subject.push((m.subject_id, vec![m.reason])),
        }
    }
    by_subject
        .into_iter()
        .map(|(id, reasons)| RenderedSubject {
            name: subject_names.get(&id).map(String::as_str).unwrap_or("Untitled subject"),
            reasons,
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence
// ────────────────────────────────────────────────────────────────────────────

/// Creates (or refreshes) the notifications of one meeting phase.
pub async fn create_notifications_for_meeting(
    pool: &PgPool,
    radii: &ProximityRadii,
    city_id: &str,
    meeting_id: &str,
    kind: NotificationType,
    overrides: &HashMap<Uuid, ImportanceOverride>,
) -> Result<BuildSummary, AppError> {
    let meeting = require_meeting(pool, city_id, meeting_id).await?;

    let subject_rows = sqlx::query_as::<_, SubjectMatchRow>(
        r#"
        SELECT s.id, s.name, s.topic_id,
               ST_Y(l.coordinates::geometry) AS lat,
               ST_X(l.coordinates::geometry) AS lng
        FROM subjects s
        LEFT JOIN locations l ON l.id = s.location_id
        WHERE s.meeting_id = $1 AND s.city_id = $2
        "#,
    )
    .bind(meeting_id)
    .bind(city_id)
    .fetch_all(pool)
    .await?;

    let subjects: Vec<SubjectForMatching> = subject_rows
        .iter()
        .map(|row| SubjectForMatching {
            id: row.id,
            topic_id: row.topic_id,
            location: row.lat.zip(row.lng).map(|(lat, lng)| GeoPoint::new(lat, lng)),
        })
        .collect();
    let subject_names: HashMap<Uuid, String> = subject_rows
        .into_iter()
        .map(|row| (row.id, row.name))
        .collect();

    let (candidates, recipients) = load_candidates(pool, city_id).await?;
    let matches = match_subjects(&subjects, &candidates, overrides, radii);
    let plan = plan_notifications(&matches, &recipients, &subject_names, &meeting, kind);

    info!(
        "Meeting {city_id}/{meeting_id} ({}): {} subjects, {} users with preferences, {} to notify",
        kind.as_str(),
        subjects.len(),
        candidates.len(),
        plan.len()
    );

    let mut summary = BuildSummary::default();
    let mut tx = pool.begin().await?;

    for planned in &plan {
        let mut savepoint = tx.begin().await?;
        match write_notification(&mut savepoint, city_id, meeting_id, kind, planned).await {
            Ok(()) => {
                savepoint.commit().await?;
                summary.notifications_created += 1;
                summary.subjects_total += planned.matches.len();
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!(
                    "Failed to write {} notification for user {} on meeting {meeting_id}: {e}",
                    kind.as_str(),
                    planned.user_id
                );
                summary.failed_users += 1;
            }
        }
    }

    tx.commit().await?;

    info!(
        "Meeting {city_id}/{meeting_id} ({}): {} notifications, {} subject matches, {} failed",
        kind.as_str(),
        summary.notifications_created,
        summary.subjects_total,
        summary.failed_users
    );
    Ok(summary)
}

async fn load_candidates(
    pool: &PgPool,
    city_id: &str,
) -> Result<(Vec<MatchCandidate>, HashMap<Uuid, Recipient>), sqlx::Error> {
    let holders = sqlx::query_as::<_, PreferenceHolderRow>(
        r#"
        SELECT u.id AS user_id, u.name, u.email, u.phone
        FROM notification_preferences np
        JOIN users u ON u.id = np.user_id
        WHERE np.city_id = $1
        "#,
    )
    .bind(city_id)
    .fetch_all(pool)
    .await?;

    let topics = sqlx::query_as::<_, PreferenceTopicRow>(
        r#"
        SELECT np.user_id, npt.topic_id
        FROM notification_preference_topics npt
        JOIN notification_preferences np ON np.id = npt.preference_id
        WHERE np.city_id = $1
        "#,
    )
    .bind(city_id)
    .fetch_all(pool)
    .await?;

    let locations = sqlx::query_as::<_, PreferenceLocationRow>(
        r#"
        SELECT np.user_id,
               ST_Y(l.coordinates::geometry) AS lat,
               ST_X(l.coordinates::geometry) AS lng
        FROM notification_preference_locations npl
        JOIN notification_preferences np ON np.id = npl.preference_id
        JOIN locations l ON l.id = npl.location_id
        WHERE np.city_id = $1
        "#,
    )
    .bind(city_id)
    .fetch_all(pool)
    .await?;

    Ok(assemble_candidates(holders, topics, locations))
}

async fn write_notification(
    conn: &mut PgConnection,
    city_id: &str,
    meeting_id: &str,
    kind: NotificationType,
    planned: &PlannedNotification,
) -> Result<(), sqlx::Error> {
    let notification_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO notifications (id, user_id, city_id, meeting_id, type)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, city_id, meeting_id, type)
        DO UPDATE SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(planned.user_id)
    .bind(city_id)
    .bind(meeting_id)
    .bind(kind.as_str())
    .fetch_one(&mut *conn)
    .await?;

    for m in &planned.matches {
        sqlx::query(
            r#"
            INSERT INTO notification_subjects (notification_id, subject_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (notification_id, subject_id, reason) DO NOTHING
            "#,
        )
        .bind(notification_id)
        .bind(m.subject_id)
        .bind(m.reason.as_str())
        .execute(&mut *conn)
        .await?;
    }

    for delivery in &planned.deliveries {
        sqlx::query(
            r#"
            INSERT INTO notification_deliveries (id, notification_id, medium, status, address, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (notification_id, medium)
            DO UPDATE SET address = EXCLUDED.address, body = EXCLUDED.body
            WHERE notification_deliveries.status = 'pending'
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification_id)
        .bind(delivery.medium.as_str())
        .bind(DeliveryStatus::Pending.as_str())
        .bind(&delivery.address)
        .bind(&delivery.body)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
