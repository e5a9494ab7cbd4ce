//! Admin reporting: notifications grouped by meeting, with per-phase delivery counts.
//!
//! Filtering happens in SQL; grouping and pagination over meeting groups happen
//! here so the page boundaries always fall between meetings, never inside one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::notification::{DeliveryStatus, NotificationType};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminFilters {
    pub city_id: Option<String>,
    pub status: Option<DeliveryStatus>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl AdminFilters {
    /// Returns `(page, page_size)` after applying defaults and bounds.
    pub fn page_params(&self) -> Result<(u32, u32), AppError> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok((page, page_size))
    }
}

/// Meeting date range. Without explicit dates the window opens 30 days ago
/// and stays open towards the future so scheduled meetings are always listed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn resolve(
        now: DateTime<Utc>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            start: start.unwrap_or(now - Duration::days(DEFAULT_LOOKBACK_DAYS)),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.map_or(true, |end| at <= end)
    }
}

/// One notification with its delivery counts.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationAggregateRow {
    pub notification_id: Uuid,
    pub meeting_id: String,
    pub city_id: String,
    pub meeting_name: String,
    pub meeting_date: DateTime<Utc>,
    pub notification_type: String,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub notifications: i64,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    /// pending + sent + failed
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingGroup {
    pub meeting_id: String,
    pub city_id: String,
    pub meeting_name: String,
    pub meeting_date: DateTime<Utc>,
    pub before: Option<PhaseSummary>,
    pub after: Option<PhaseSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    /// Number of meeting groups across all pages.
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminNotificationsResponse {
    pub meetings: Vec<MeetingGroup>,
    pub pagination: Pagination,
}

/// Builds the filtered per-notification aggregate query.
pub fn build_aggregate_query(
    filters: &AdminFilters,
    window: &DateWindow,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        r#"
        SELECT n.id AS notification_id, n.meeting_id, n.city_id,
               m.name AS meeting_name, m.date_time AS meeting_date,
               n.type AS notification_type,
               COUNT(d.id) FILTER (WHERE d.status = 'pending') AS pending,
               COUNT(d.id) FILTER (WHERE d.status = 'sent') AS sent,
               COUNT(d.id) FILTER (WHERE d.status = 'failed') AS failed
        FROM notifications n
        JOIN council_meetings m ON m.id = n.meeting_id AND m.city_id = n.city_id
        LEFT JOIN notification_deliveries d ON d.notification_id = n.id
        WHERE m.date_time >= "#,
    );
    builder.push_bind(window.start);

    if let Some(end) = window.end {
        builder.push(" AND m.date_time <= ").push_bind(end);
    }
    if let Some(city_id) = &filters.city_id {
        builder.push(" AND n.city_id = ").push_bind(city_id.clone());
    }
    if let Some(kind) = filters.notification_type {
        builder.push(" AND n.type = ").push_bind(kind.as_str());
    }
    if let Some(status) = filters.status {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM notification_deliveries sd \
                 WHERE sd.notification_id = n.id AND sd.status = ",
            )
            .push_bind(status.as_str())
            .push(")");
    }

    builder.push(" GROUP BY n.id, m.name, m.date_time");
    builder
}

/// Folds notification rows into one group per (meeting, city), newest meeting first.
pub fn group_by_meeting(rows: Vec<NotificationAggregateRow>) -> Vec<MeetingGroup> {
    let mut groups: HashMap<(String, String), MeetingGroup> = HashMap::new();

    for row in rows {
        let Some(kind) = NotificationType::parse(&row.notification_type) else {
            warn!(
                "Notification {} has unknown type '{}'; leaving it out of the report",
                row.notification_id, row.notification_type
            );
            continue;
        };

        let group = groups
            .entry((row.meeting_id.clone(), row.city_id.clone()))
            .or_insert_with(|| MeetingGroup {
                meeting_id: row.meeting_id.clone(),
                city_id: row.city_id.clone(),
                meeting_name: row.meeting_name.clone(),
                meeting_date: row.meeting_date,
                before: None,
                after: None,
            });

        let phase = match kind {
            NotificationType::BeforeMeeting => &mut group.before,
            NotificationType::AfterMeeting => &mut group.after,
        };
        let summary = phase.get_or_insert_with(PhaseSummary::default);
        summary.notifications += 1;
        summary.pending += row.pending;
        summary.sent += row.sent;
        summary.failed += row.failed;
        summary.total += row.pending + row.sent + row.failed;
    }

    let mut groups: Vec<MeetingGroup> = groups.into_values().collect();
    groups.sort_by(|a, b| {
        b.meeting_date
            .cmp(&a.meeting_date)
            .then_with(|| a.meeting_id.cmp(&b.meeting_id))
            .then_with(|| a.city_id.cmp(&b.city_id))
    });
    groups
}

/// Cuts one page out of the groups. Pages past the end are empty but still
/// report the real total.
pub fn paginate(groups: Vec<MeetingGroup>, page: u32, page_size: u32) -> AdminNotificationsResponse {
    let total = groups.len();
    let size = page_size as usize;
    let total_pages = total.div_ceil(size);
    let offset = (page as usize - 1).saturating_mul(size);

    let meetings = groups.into_iter().skip(offset).take(size).collect();
    AdminNotificationsResponse {
        meetings,
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages,
        },
    }
}

pub async fn get_notifications_grouped_by_meeting(
    pool: &PgPool,
    filters: &AdminFilters,
    now: DateTime<Utc>,
) -> Result<AdminNotificationsResponse, AppError> {
    let (page, page_size) = filters.page_params()?;
    let window = DateWindow::resolve(now, filters.start_date, filters.end_date);

    let mut query = build_aggregate_query(filters, &window);
    let rows = query
        .build_query_as::<NotificationAggregateRow>()
        .fetch_all(pool)
        .await?;

    Ok(paginate(group_by_meeting(rows), page, page_size))
}
