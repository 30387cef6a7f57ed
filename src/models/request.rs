use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's request to book a room that is not currently occupied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub id: String,
    pub building: String,
    pub room: String,
    pub requested_at: DateTime<Utc>,
}

impl RoomRequest {
    pub fn new(building: impl Into<String>, room: impl Into<String>, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            building: building.into(),
            room: room.into(),
            requested_at,
        }
    }
}
