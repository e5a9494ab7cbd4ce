use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::errors::AppError;
use crate::models::meeting::MeetingRow;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established ({max_connections} max connections)");
    Ok(pool)
}

/// Loads a meeting of a city, failing with `NotFound` when it does not exist.
pub async fn require_meeting(
    pool: &PgPool,
    city_id: &str,
    meeting_id: &str,
) -> Result<MeetingRow, AppError> {
    sqlx::query_as::<_, MeetingRow>(
        "SELECT id, city_id, name, date_time FROM council_meetings WHERE id = $1 AND city_id = $2",
    )
    .bind(meeting_id)
    .bind(city_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Meeting {city_id}/{meeting_id} not found")))
}
