use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Presentation state of a room, derived from its bound badge's scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RoomStatus {
    Available,
    Occupied,
    Pending,
}

impl Default for RoomStatus {
    fn default() -> Self {
        RoomStatus::Pending
    }
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "Available",
            RoomStatus::Occupied => "Occupied",
            RoomStatus::Pending => "Pending",
        }
    }

    /// Legend colour used by the room grid.
    pub fn color(&self) -> &'static str {
        match self {
            RoomStatus::Available => "#4CAF50",
            RoomStatus::Occupied => "red",
            RoomStatus::Pending => "#FFA500",
        }
    }

    /// Occupied rooms cannot be requested.
    pub fn ensure_requestable(&self) -> Result<()> {
        if *self == RoomStatus::Occupied {
            bail!("room is currently occupied");
        }
        Ok(())
    }
}
