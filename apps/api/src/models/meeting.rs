use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MeetingRow {
    pub id: String,
    pub city_id: String,
    pub name: String,
    pub date_time: DateTime<Utc>,
}
