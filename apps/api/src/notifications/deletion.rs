use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::errors::AppError;
use crate::models::notification::NotificationType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionTarget {
    pub meeting_id: String,
    pub city_id: String,
}

/// Builds a DELETE over every (meeting, city) pair, optionally limited to one type.
/// Subject links and deliveries go with their notification via ON DELETE CASCADE.
pub fn build_delete_query(
    targets: &[DeletionTarget],
    kind: Option<NotificationType>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("DELETE FROM notifications WHERE (meeting_id, city_id) IN (");
    for (i, target) in targets.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder
            .push("(")
            .push_bind(target.meeting_id.clone())
            .push(", ")
            .push_bind(target.city_id.clone())
            .push(")");
    }
    builder.push(")");

    if let Some(kind) = kind {
        builder.push(" AND type = ").push_bind(kind.as_str());
    }
    builder
}

/// Deletes the notifications of the given meetings and returns how many
/// notification rows went away. Unknown targets simply delete nothing.
pub async fn delete_notifications_for_meetings(
    pool: &PgPool,
    targets: &[DeletionTarget],
    kind: Option<NotificationType>,
) -> Result<u64, AppError> {
    if targets.is_empty() {
        return Ok(0);
    }

    let mut query = build_delete_query(targets, kind);
    let deleted = query.build().execute(pool).await?.rows_affected();

    info!(
        "Deleted {deleted} notifications across {} meetings (type: {})",
        targets.len(),
        kind.map(|k| k.as_str()).unwrap_or("any")
    );
    Ok(deleted)
}
