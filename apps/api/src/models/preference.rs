use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user holding a notification preference for one city.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PreferenceHolderRow {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One topic in a user's interest set.
#[derive(Debug, Clone, FromRow)]
pub struct PreferenceTopicRow {
    pub user_id: Uuid,
    pub topic_id: Uuid,
}

/// One area of interest, with its point geometry unpacked to lat/lng.
#[derive(Debug, Clone, FromRow)]
pub struct PreferenceLocationRow {
    pub user_id: Uuid,
    pub lat: f64,
    pub lng: f64,
}
