use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::notification::{DeliveryStatus, NotificationDeliveryRow};

pub const DEFAULT_PENDING_LIMIT: i64 = 100;
pub const MAX_PENDING_LIMIT: i64 = 500;

/// Oldest pending deliveries first. The transport marks them sent or failed.
pub async fn list_pending_deliveries(
    pool: &PgPool,
    limit: Option<i64>,
) -> Result<Vec<NotificationDeliveryRow>, AppError> {
    let limit = limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    if !(1..=MAX_PENDING_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PENDING_LIMIT}"
        )));
    }

    Ok(sqlx::query_as::<_, NotificationDeliveryRow>(
        r#"
        SELECT id, notification_id, medium, status, address, body, created_at
        FROM notification_deliveries
        WHERE status = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(DeliveryStatus::Pending.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?)
}
